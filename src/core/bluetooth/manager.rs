//! Bluetooth manager
//! This module provides the main interface for bluetooth operations. One
//! manager backs one screen: it owns the session state, the components that
//! mutate it, and the transport event subscriptions.

use std::sync::Arc;

use log::{error, info};
use tokio::sync::{Mutex, broadcast};

use crate::config::ble_config::BleConfig;
use crate::core::bluetooth::connection::ConnectionSequencer;
use crate::core::bluetooth::data_channel::DataChannel;
use crate::core::bluetooth::dispatcher::{EventDispatcher, EventRouter};
use crate::core::bluetooth::error::{BleError, ConnectOutcome, Result, Unavailability};
use crate::core::bluetooth::scanner::{ScanController, ScanOutcome};
use crate::core::bluetooth::session::{SessionState, SharedSession};
use crate::core::bluetooth::transport::PeripheralTransport;
use crate::core::bluetooth::types::{
    CharacteristicUpdate, Peripheral, PeripheralId, ServiceBinding, SessionSnapshot,
};

/// Manages Bluetooth operations
pub struct BluetoothManager<T: PeripheralTransport> {
    transport: Arc<T>,
    session: SharedSession,
    config: Arc<BleConfig>,
    scanner: ScanController<T>,
    sequencer: ConnectionSequencer<T>,
    data: DataChannel<T>,
    dispatcher: Mutex<Option<EventDispatcher>>,
}

impl<T: PeripheralTransport> BluetoothManager<T> {
    /// Starts the transport and registers the event handlers.
    pub async fn new(transport: T, config: BleConfig) -> Result<Self> {
        if let Err(e) = transport.initialize().await {
            error!("Bluetooth transport could not be started: {}", e);
            return Err(BleError::TransportUnavailable(Unavailability::NotInitialized(e)));
        }
        info!("Bluetooth transport started.");

        let transport = Arc::new(transport);
        let session = SessionState::shared();
        let config = Arc::new(config);

        let scanner = ScanController::new(transport.clone(), session.clone(), config.clone());
        let sequencer = ConnectionSequencer::new(transport.clone(), session.clone(), config.clone());
        let data = DataChannel::new(transport.clone(), session.clone(), config.clone());

        let dispatcher = EventDispatcher::attach(
            transport.as_ref(),
            EventRouter {
                scanner: scanner.clone(),
                sequencer: sequencer.clone(),
                data: data.clone(),
            },
        );

        Ok(Self {
            transport,
            session,
            config,
            scanner,
            sequencer,
            data,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    pub fn config(&self) -> &BleConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn start_scan(&self) -> Result<ScanOutcome> {
        self.scanner.start_scan().await
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.scanner.stop_scan().await
    }

    /// Asks the platform to turn the adapter on. On platforms where this is
    /// not allowed the call does nothing and the user has to use system settings.
    pub async fn enable_adapter(&self) -> Result<()> {
        info!("Requesting adapter enable");
        self.transport.request_enable().await?;
        Ok(())
    }

    pub async fn connect(&self, id: &PeripheralId) -> Result<ConnectOutcome> {
        self.sequencer.connect(id).await
    }

    pub async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        self.sequencer.disconnect(id).await
    }

    pub async fn read(&self, binding: &ServiceBinding) -> Result<Vec<u8>> {
        self.data.read(binding).await
    }

    pub async fn write(&self, binding: &ServiceBinding, payload: &[u8]) -> Result<()> {
        self.data.write_default(binding, payload).await
    }

    pub async fn write_with_packet_size(
        &self,
        binding: &ServiceBinding,
        payload: &[u8],
        max_packet_size: usize,
    ) -> Result<()> {
        self.data.write(binding, payload, max_packet_size).await
    }

    pub fn notifications(&self) -> broadcast::Receiver<CharacteristicUpdate> {
        self.data.notifications()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Known peripherals in discovery order.
    pub async fn peripherals(&self) -> Vec<Peripheral> {
        self.session.lock().await.registry.list()
    }

    pub async fn peripheral(&self, id: &PeripheralId) -> Option<Peripheral> {
        self.session.lock().await.registry.get(id).cloned()
    }

    pub async fn binding(&self) -> Option<ServiceBinding> {
        self.session.lock().await.binding.clone()
    }

    pub async fn is_scanning(&self) -> bool {
        self.scanner.is_scanning().await
    }

    /// True while a binding is published.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.binding.is_some()
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.dispatcher
            .lock()
            .await
            .as_ref()
            .map_or(0, EventDispatcher::active_subscriptions)
    }

    /// Releases the event subscriptions and forgets all session state.
    /// Dropping the manager releases the subscriptions as well.
    pub async fn shutdown(&self) {
        let dispatcher = self.dispatcher.lock().await.take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.detach().await;
        }
        self.session.lock().await.reset();
        info!("Bluetooth manager shut down.");
    }
}
