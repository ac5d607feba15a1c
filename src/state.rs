//! Application state management
//! This module defines the state a screen holds for its lifetime.

use std::sync::Arc;

use log::info;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::core::bluetooth::error::Result;
use crate::core::bluetooth::{BluetoothManager, PeripheralTransport};
use crate::logging::LogMessage;

/// State owned by one screen
pub struct AppState<T: PeripheralTransport> {
    /// The Bluetooth manager instance
    pub bluetooth_manager: Arc<BluetoothManager<T>>,
    pub config: AppConfig,
    /// Log records for the screen's log pane, when the screen logger is installed
    pub log_feed: Option<broadcast::Receiver<LogMessage>>,
}

impl<T: PeripheralTransport> AppState<T> {
    /// Creates a new AppState instance
    pub async fn new(
        transport: T,
        config: AppConfig,
        log_feed: Option<broadcast::Receiver<LogMessage>>,
    ) -> Result<Self> {
        info!("Initializing BluetoothManager...");
        let manager = BluetoothManager::new(transport, config.ble.clone()).await?;
        Ok(Self {
            bluetooth_manager: Arc::new(manager),
            config,
            log_feed,
        })
    }

    /// Gets a reference to the Bluetooth manager
    pub fn get_bluetooth_manager_arc(&self) -> Arc<BluetoothManager<T>> {
        self.bluetooth_manager.clone()
    }
}
