//! Data exchange with a Ready peripheral
//! Reads and writes go through the published `ServiceBinding`; notifications
//! pushed by the peripheral are logged and re-published to listeners.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::broadcast;
use tokio::time::sleep;

use crate::config::ble_config::BleConfig;
use crate::core::bluetooth::constants::BROADCAST_CAPACITY;
use crate::core::bluetooth::error::{BleError, Result};
use crate::core::bluetooth::session::SharedSession;
use crate::core::bluetooth::transport::PeripheralTransport;
use crate::core::bluetooth::types::{CharacteristicUpdate, ConnectionStatus, ServiceBinding};

pub struct DataChannel<T: PeripheralTransport> {
    transport: Arc<T>,
    session: SharedSession,
    config: Arc<BleConfig>,
    notifications: broadcast::Sender<CharacteristicUpdate>,
}

impl<T: PeripheralTransport> Clone for DataChannel<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            session: self.session.clone(),
            config: self.config.clone(),
            notifications: self.notifications.clone(),
        }
    }
}

impl<T: PeripheralTransport> DataChannel<T> {
    pub fn new(transport: Arc<T>, session: SharedSession, config: Arc<BleConfig>) -> Self {
        let (notifications, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            transport,
            session,
            config,
            notifications,
        }
    }

    /// Subscribes to the receive characteristic, waits for the subscription to
    /// settle, then writes `payload` in chunks of at most `max_packet_size`.
    /// Nothing is written if the peripheral left `Ready` during the settle.
    pub async fn write(&self, binding: &ServiceBinding, payload: &[u8], max_packet_size: usize) -> Result<()> {
        self.ensure_ready(binding).await?;
        let id = &binding.peripheral_id;

        self.transport
            .start_notification(id, binding.service, binding.receive)
            .await?;
        sleep(self.config.post_subscribe_settle()).await;
        // The link may have dropped while settling.
        self.ensure_ready(binding).await?;

        info!("[write][{}] writing {} bytes to {}", id, payload.len(), binding.transfer);
        self.transport
            .write(id, binding.service, binding.transfer, payload, max_packet_size)
            .await?;
        Ok(())
    }

    /// `write` with the configured max packet size.
    pub async fn write_default(&self, binding: &ServiceBinding, payload: &[u8]) -> Result<()> {
        self.write(binding, payload, self.config.max_packet_size).await
    }

    /// Reads the receive characteristic once.
    pub async fn read(&self, binding: &ServiceBinding) -> Result<Vec<u8>> {
        self.ensure_ready(binding).await?;
        let data = self
            .transport
            .read(&binding.peripheral_id, binding.service, binding.receive)
            .await?;
        debug!("[read][{}] received {:?}", binding.peripheral_id, data);
        Ok(data)
    }

    /// Stream of characteristic updates pushed by peripherals.
    pub fn notifications(&self) -> broadcast::Receiver<CharacteristicUpdate> {
        self.notifications.subscribe()
    }

    /// Characteristic-update callback. Never mutates session state.
    pub fn on_characteristic_update(&self, update: CharacteristicUpdate) {
        debug!(
            "[on_characteristic_update] received data from '{}' with characteristic='{}' and value={:?}",
            update.peripheral_id, update.characteristic, update.value
        );
        // No listeners is fine.
        let _ = self.notifications.send(update);
    }

    /// Accepts only the published binding of a `Ready` peripheral.
    async fn ensure_ready(&self, binding: &ServiceBinding) -> Result<()> {
        let session = self.session.lock().await;
        let ready = session.registry.status(&binding.peripheral_id) == Some(&ConnectionStatus::Ready);
        if ready && session.binding.as_ref() == Some(binding) {
            Ok(())
        } else {
            debug!("[ensure_ready][{}] rejected, not the binding of a ready peripheral", binding.peripheral_id);
            Err(BleError::not_ready(&binding.peripheral_id))
        }
    }
}
