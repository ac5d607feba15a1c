//! Bluetooth connection handling
//! This module drives the per-peripheral connection lifecycle:
//! connect → settle → service discovery → RSSI → descriptors → ready,
//! and the matching teardown.
//!
//! Every step that resumes after an await re-checks the sequence token taken
//! when the attempt started. A disconnect (explicit or unsolicited) drops the
//! token, so a suspended attempt notices it is stale and stops without
//! mutating anything.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::time::sleep;

use crate::config::ble_config::BleConfig;
use crate::core::bluetooth::error::{
    BleError, ConnectOutcome, Degradation, FailureReason, Rejection, Result, TransportError,
};
use crate::core::bluetooth::session::{SequenceToken, SharedSession};
use crate::core::bluetooth::transport::PeripheralTransport;
use crate::core::bluetooth::types::{ConnectionStatus, PeripheralId, ServiceTree};

/// Connection sequencer for all peripherals of a session
pub struct ConnectionSequencer<T: PeripheralTransport> {
    transport: Arc<T>,
    session: SharedSession,
    config: Arc<BleConfig>,
}

impl<T: PeripheralTransport> Clone for ConnectionSequencer<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            session: self.session.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: PeripheralTransport> ConnectionSequencer<T> {
    pub fn new(transport: Arc<T>, session: SharedSession, config: Arc<BleConfig>) -> Self {
        Self {
            transport,
            session,
            config,
        }
    }

    /// Runs the full connection sequence for `id`.
    ///
    /// Rejected without side effects unless the peripheral is idle
    /// (`Discovered`, `Disconnected` or `Failed`). Transport failures are not
    /// returned as errors; they are recorded as `Failed(reason)` and reported
    /// through the outcome.
    pub async fn connect(&self, id: &PeripheralId) -> Result<ConnectOutcome> {
        let token = {
            let mut session = self.session.lock().await;
            let status = session
                .registry
                .status(id)
                .ok_or_else(|| BleError::OperationRejected(Rejection::UnknownPeripheral(id.clone())))?;
            if !status.is_connectable() || session.has_sequence(id) {
                warn!("[connect][{}] rejected, peripheral is {}", id, status);
                return Err(BleError::OperationRejected(Rejection::AlreadyInProgress(id.clone())));
            }
            let token = session.begin_sequence(id);
            session.registry.set_status(id, ConnectionStatus::Connecting);
            token
        };

        info!("[connect][{}] initiating connection...", id);
        if let Err(e) = self.transport.connect(id).await {
            return Ok(self.fail(id, token, FailureReason::Transport(e)).await);
        }

        if !self.advance(id, token, ConnectionStatus::Connected).await {
            return Ok(ConnectOutcome::Interrupted);
        }
        info!("[connect][{}] connected.", id);

        // Let bonding and link setup finish before retrieving services.
        sleep(self.config.post_connect_settle()).await;
        if !self.advance(id, token, ConnectionStatus::ServicesResolving).await {
            return Ok(ConnectOutcome::Interrupted);
        }

        info!("[connect][{}] discovering services...", id);
        let tree = match self.transport.discover_services(id).await {
            Ok(tree) => tree,
            Err(e) => return Ok(self.fail(id, token, FailureReason::Transport(e)).await),
        };
        if !self.is_current(id, token).await {
            return Ok(ConnectOutcome::Interrupted);
        }
        if !tree.has_characteristics() {
            warn!("[connect][{}] no characteristics found", id);
            return Ok(self.fail(id, token, FailureReason::NoServices).await);
        }
        if !tree.contains_service(self.config.service_uuid) {
            warn!(
                "[connect][{}] target service {} not advertised by the peripheral",
                id, self.config.service_uuid
            );
        }

        let mut degradations = Vec::new();
        match self.transport.read_rssi(id).await {
            Ok(rssi) => {
                let mut session = self.session.lock().await;
                if !session.is_current(id, token) {
                    return Ok(ConnectOutcome::Interrupted);
                }
                session.registry.set_rssi(id, rssi);
                debug!("[connect][{}] RSSI {}", id, rssi);
            }
            Err(e) => {
                warn!("[connect][{}] could not read RSSI: {}", id, e);
                degradations.push(Degradation::RssiUnavailable(e));
            }
        }

        match self.read_descriptors(id, token, &tree).await {
            Some(skipped) => degradations.extend(skipped),
            None => return Ok(ConnectOutcome::Interrupted),
        }

        let binding = self.config.binding_for(id);
        let mut session = self.session.lock().await;
        if !session.is_current(id, token) {
            return Ok(ConnectOutcome::Interrupted);
        }
        session.registry.set_status(id, ConnectionStatus::Ready);
        session.binding = Some(binding.clone());
        session.finish_sequence(id, token);
        info!("[connect][{}] ready, {} steps degraded", id, degradations.len());

        Ok(ConnectOutcome::Ready {
            binding,
            degradations,
        })
    }

    /// Tears down the link to `id` and forgets the peripheral.
    ///
    /// Local state is always cleared, even if the transport call fails.
    /// Calling this for a peripheral that is already `Disconnected` (or
    /// unknown) changes nothing and issues no transport call.
    pub async fn disconnect(&self, id: &PeripheralId) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            match session.registry.status(id) {
                None | Some(ConnectionStatus::Disconnected) => {
                    debug!("[disconnect][{}] already disconnected", id);
                    return Ok(());
                }
                Some(_) => {}
            }
            session.invalidate_sequence(id);
            session.clear_binding_for(id);
            session.registry.set_status(id, ConnectionStatus::Disconnecting);
        }

        info!("[disconnect][{}] disconnecting...", id);
        let result = self.transport.disconnect(id).await;
        if let Err(e) = &result {
            error!("[disconnect][{}] disconnect error: {}", id, e);
        }

        let mut session = self.session.lock().await;
        // A reconnect may have started once an ack moved us to Disconnected.
        if !session.has_sequence(id) {
            session.registry.remove(id);
            session.clear_binding_for(id);
            info!("[disconnect][{}] peripheral cleared", id);
        }

        result.map_err(BleError::from)
    }

    /// Transport connect acknowledgement.
    pub async fn on_connect_ack(&self, id: &PeripheralId) {
        info!("[on_connect_ack][{}] connected.", id);
        let mut session = self.session.lock().await;
        if session.registry.status(id) == Some(&ConnectionStatus::Connecting) {
            session.registry.set_status(id, ConnectionStatus::Connected);
        }
    }

    /// Transport disconnect callback, solicited or not. Always wins over any
    /// sequence in flight.
    pub async fn on_disconnect(&self, id: &PeripheralId) {
        info!("[on_disconnect][{}] disconnected.", id);
        let mut session = self.session.lock().await;
        if session.invalidate_sequence(id) {
            debug!("[on_disconnect][{}] pending connection attempt abandoned", id);
        }
        session.clear_binding_for(id);
        session.registry.set_status(id, ConnectionStatus::Disconnected);
    }

    async fn is_current(&self, id: &PeripheralId, token: SequenceToken) -> bool {
        self.session.lock().await.is_current(id, token)
    }

    /// Moves to `status` if the attempt is still current.
    async fn advance(&self, id: &PeripheralId, token: SequenceToken, status: ConnectionStatus) -> bool {
        let mut session = self.session.lock().await;
        if !session.is_current(id, token) {
            debug!("[connect][{}] attempt superseded before {}", id, status);
            return false;
        }
        session.registry.set_status(id, status);
        true
    }

    async fn fail(&self, id: &PeripheralId, token: SequenceToken, reason: FailureReason) -> ConnectOutcome {
        let mut session = self.session.lock().await;
        if !session.is_current(id, token) {
            debug!("[connect][{}] ignoring failure of superseded attempt: {}", id, reason);
            return ConnectOutcome::Interrupted;
        }
        error!("[connect][{}] connection failed: {}", id, reason);
        session.registry.set_status(id, ConnectionStatus::Failed(reason.clone()));
        session.clear_binding_for(id);
        session.finish_sequence(id, token);
        ConnectOutcome::Failed(reason)
    }

    /// Reads every descriptor once. Unreadable ones are skipped and reported.
    /// Returns `None` if the attempt went stale while reading.
    async fn read_descriptors(
        &self,
        id: &PeripheralId,
        token: SequenceToken,
        tree: &ServiceTree,
    ) -> Option<Vec<Degradation>> {
        let mut skipped = Vec::new();
        for (service, characteristic) in tree.characteristics() {
            for &descriptor in &characteristic.descriptors {
                let result = self
                    .transport
                    .read_descriptor(id, service, characteristic.uuid, descriptor)
                    .await;
                if !self.is_current(id, token).await {
                    return None;
                }
                match result {
                    Ok(data) => debug!("[read_descriptor][{}] descriptor {} = {:?}", id, descriptor, data),
                    Err(e) => {
                        warn!(
                            "[connect][{}] failed to retrieve descriptor {} for characteristic {}: {}",
                            id, descriptor, characteristic.uuid, e
                        );
                        skipped.push(descriptor_degradation(service, characteristic.uuid, descriptor, e));
                    }
                }
            }
        }
        Some(skipped)
    }
}

fn descriptor_degradation(
    service: uuid::Uuid,
    characteristic: uuid::Uuid,
    descriptor: uuid::Uuid,
    error: TransportError,
) -> Degradation {
    Degradation::DescriptorUnreadable {
        service,
        characteristic,
        descriptor,
        error,
    }
}
