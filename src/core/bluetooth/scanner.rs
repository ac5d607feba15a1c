use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::ble_config::BleConfig;
use crate::core::bluetooth::error::{BleError, Result};
use crate::core::bluetooth::session::SharedSession;
use crate::core::bluetooth::transport::PeripheralTransport;
use crate::core::bluetooth::types::{AdapterState, DiscoveredPeripheral, ScanState};

/// What `start_scan` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Started,
    /// A session was already running; nothing was changed.
    AlreadyScanning,
}

/// Drives discovery sessions and feeds advertisements into the registry.
pub struct ScanController<T: PeripheralTransport> {
    transport: Arc<T>,
    session: SharedSession,
    config: Arc<BleConfig>,
}

impl<T: PeripheralTransport> Clone for ScanController<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            session: self.session.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: PeripheralTransport> ScanController<T> {
    pub fn new(transport: Arc<T>, session: SharedSession, config: Arc<BleConfig>) -> Self {
        Self {
            transport,
            session,
            config,
        }
    }

    /// Starts a timed discovery session from an empty registry.
    ///
    /// A silent no-op while a session is already running. Otherwise refuses
    /// with `TransportUnavailable` while the adapter is powered off.
    pub async fn start_scan(&self) -> Result<ScanOutcome> {
        if self.is_scanning().await {
            debug!("Scan already running, ignoring start request");
            return Ok(ScanOutcome::AlreadyScanning);
        }

        let adapter_state = self.transport.adapter_state().await;
        debug!("Adapter state before scan: {:?}", adapter_state);
        match adapter_state {
            AdapterState::PoweredOff => {
                warn!("Bluetooth is powered off, scan not started");
                return Err(BleError::powered_off());
            }
            AdapterState::Unknown => warn!("Adapter state unknown, trying to scan anyway"),
            AdapterState::PoweredOn => {}
        }

        {
            let mut session = self.session.lock().await;
            if session.scan == ScanState::Scanning {
                debug!("Scan already running, ignoring start request");
                return Ok(ScanOutcome::AlreadyScanning);
            }
            session.clear_peripherals();
            session.scan = ScanState::Scanning;
        }

        let request = self.config.scan_request();
        info!(
            "Starting bluetooth scan for {:?} (filter: {:?}, duplicates: {})",
            request.duration, request.service_filter, request.allow_duplicates
        );
        if let Err(e) = self.transport.start_scan(&request).await {
            error!("Bluetooth scan returned in error: {}", e);
            self.session.lock().await.scan = ScanState::Idle;
            return Err(e.into());
        }

        Ok(ScanOutcome::Started)
    }

    /// Asks the transport to end the session early. The transport's
    /// scan-stop callback then moves the controller back to `Idle`.
    pub async fn stop_scan(&self) -> Result<()> {
        if !self.is_scanning().await {
            debug!("No scan running, nothing to stop");
            return Ok(());
        }
        info!("Stopping Bluetooth scan.");
        self.transport.stop_scan().await?;
        Ok(())
    }

    pub async fn is_scanning(&self) -> bool {
        self.session.lock().await.scan == ScanState::Scanning
    }

    /// Discovery callback: insert or refresh the advertised peripheral.
    pub async fn on_discover(&self, discovered: DiscoveredPeripheral) {
        debug!(
            "Found device - ID: {}, Name: {:?}, RSSI: {:?}",
            discovered.id, discovered.name, discovered.rssi
        );
        let mut session = self.session.lock().await;
        session.registry.upsert(discovered.into_peripheral());
    }

    /// Scan-stop callback. Idempotent.
    pub async fn on_scan_stop(&self) {
        let mut session = self.session.lock().await;
        if session.scan == ScanState::Scanning {
            info!("Scan is stopped, {} peripherals known", session.registry.len());
        }
        session.scan = ScanState::Idle;
    }
}
