//! Manager start-up, event subscriptions and shutdown; the screen commands on top.

mod common;

use ble_peripheral_demo_lib::commands;
use ble_peripheral_demo_lib::config::AppConfig;
use ble_peripheral_demo_lib::config::ble_config::BleConfig;
use ble_peripheral_demo_lib::core::bluetooth::{
    AdapterState, BleError, BluetoothManager, MockCall, MockOp, MockTransport, TransportError, TransportEvent,
    UUID_TRANSFER_CHAR, Unavailability,
};
use ble_peripheral_demo_lib::state::AppState;

use common::{advert, settle};

#[tokio::test(start_paused = true)]
async fn manager_registers_one_handler_per_event_kind() {
    let transport = MockTransport::new();
    let manager = common::manager(&transport).await;

    assert_eq!(transport.active_subscriptions(), 5);
    assert_eq!(manager.active_subscriptions().await, 5);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_handlers_and_state() {
    let (transport, manager) = common::with_peripheral("AA").await;
    common::connect_ready(&manager, "AA").await;

    manager.shutdown().await;

    assert_eq!(transport.active_subscriptions(), 0);
    assert_eq!(manager.active_subscriptions().await, 0);
    let snapshot = manager.snapshot().await;
    assert!(snapshot.peripherals.is_empty());
    assert_eq!(snapshot.binding, None);

    // Nothing listens anymore.
    transport.emit(advert("BB", None, -50));
    settle().await;
    assert!(manager.peripherals().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_manager_releases_handlers() {
    let transport = MockTransport::new();
    let manager = common::manager(&transport).await;
    assert_eq!(transport.active_subscriptions(), 5);

    drop(manager);

    assert_eq!(transport.active_subscriptions(), 0);
}

#[tokio::test]
async fn failed_initialization_reports_transport_unavailable() {
    let transport = MockTransport::new();
    transport.fail(MockOp::Initialize, TransportError::AdapterUnavailable);

    let Err(err) = BluetoothManager::new(transport.clone(), BleConfig::default()).await else {
        panic!("manager should not start");
    };

    assert_eq!(
        err,
        BleError::TransportUnavailable(Unavailability::NotInitialized(TransportError::AdapterUnavailable))
    );
    assert!(err.needs_user_action());
    assert_eq!(transport.active_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn commands_drive_a_full_session() {
    let transport = MockTransport::new();
    let app_state = AppState::new(transport.clone(), AppConfig::default(), None)
        .await
        .unwrap();

    assert_eq!(commands::start_scan(&app_state).await, Ok(true));
    assert_eq!(commands::start_scan(&app_state).await, Ok(false));
    transport.emit(advert("AA", Some("Demo"), -60));
    transport.emit(TransportEvent::ScanStopped);
    settle().await;

    let snapshot = commands::session_snapshot(&app_state).await;
    assert!(!snapshot.is_scanning);
    assert_eq!(snapshot.peripherals.len(), 1);

    assert_eq!(
        commands::write(&app_state).await,
        Err("No device connected".to_string())
    );

    let binding = commands::connect_to_device("AA", &app_state).await.unwrap();
    assert_eq!(binding.transfer, UUID_TRANSFER_CHAR);

    commands::write(&app_state).await.unwrap();
    assert_eq!(
        transport.count(|call| matches!(call, MockCall::Write { data, .. } if data.as_slice() == commands::DEMO_PAYLOAD)),
        1
    );

    transport.set_read_value(b"ack".to_vec());
    assert_eq!(commands::read(&app_state).await, Ok(b"ack".to_vec()));

    commands::disconnect("AA", &app_state).await.unwrap();
    assert!(commands::session_snapshot(&app_state).await.binding.is_none());
}

#[tokio::test(start_paused = true)]
async fn commands_surface_powered_off_adapter() {
    let transport = MockTransport::new();
    transport.set_adapter_state(AdapterState::PoweredOff);
    let app_state = AppState::new(transport.clone(), AppConfig::default(), None)
        .await
        .unwrap();

    let err = commands::start_scan(&app_state).await.unwrap_err();
    assert!(err.contains("powered off"));

    commands::enable_bluetooth(&app_state).await.unwrap();
    assert_eq!(commands::start_scan(&app_state).await, Ok(true));
}

#[tokio::test(start_paused = true)]
async fn connecting_to_an_empty_peripheral_fails_through_commands() {
    let transport = MockTransport::new();
    transport.set_service_tree(Default::default());
    let app_state = AppState::new(transport.clone(), AppConfig::default(), None)
        .await
        .unwrap();
    transport.emit(advert("AA", None, -60));
    settle().await;

    let err = commands::connect_to_device("AA", &app_state).await.unwrap_err();

    assert_eq!(err, "Connection to AA failed: no-services");
}
