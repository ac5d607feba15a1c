#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ble_peripheral_demo_lib::config::ble_config::BleConfig;
use ble_peripheral_demo_lib::core::bluetooth::{
    BluetoothManager, ConnectOutcome, DiscoveredPeripheral, MockTransport, PeripheralId, ServiceBinding,
    TransportEvent,
};

pub type Manager = Arc<BluetoothManager<MockTransport>>;

pub async fn manager(transport: &MockTransport) -> Manager {
    Arc::new(
        BluetoothManager::new(transport.clone(), BleConfig::default())
            .await
            .expect("mock transport starts"),
    )
}

pub fn advert(id: &str, name: Option<&str>, rssi: i16) -> TransportEvent {
    let mut discovered = DiscoveredPeripheral::new(id).with_rssi(rssi);
    if let Some(name) = name {
        discovered = discovered.with_name(name);
    }
    TransportEvent::Discovered(discovered)
}

/// Lets the dispatch loop drain whatever was emitted.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// A manager that already knows about `id`.
pub async fn with_peripheral(id: &str) -> (MockTransport, Manager) {
    let transport = MockTransport::new();
    let manager = manager(&transport).await;
    transport.emit(advert(id, Some("Demo"), -70));
    settle().await;
    (transport, manager)
}

pub async fn connect_ready(manager: &Manager, id: &str) -> ServiceBinding {
    match manager.connect(&PeripheralId::from(id)).await {
        Ok(ConnectOutcome::Ready { binding, .. }) => binding,
        other => panic!("expected ready, got {:?}", other),
    }
}
