//! Peripheral transport interface
//! This is the capability the core needs from the radio stack. A real
//! backend wraps the platform Bluetooth API; tests use the mock transport.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::error::TransportError;
use crate::core::bluetooth::types::{
    AdapterState, PeripheralId, ScanRequest, ServiceTree, TransportEvent, TransportEventKind,
};

/// Sending half of the single ordered inbox that all subscriptions feed.
pub type EventInbox = mpsc::UnboundedSender<TransportEvent>;

/// Handle for one registered event handler.
///
/// Dropping the handle deregisters it: the transport stops forwarding events
/// of this kind to the inbox the handle was created for.
#[derive(Debug)]
pub struct Subscription {
    kind: TransportEventKind,
    token: CancellationToken,
}

impl Subscription {
    pub fn new(kind: TransportEventKind) -> Self {
        Self {
            kind,
            token: CancellationToken::new(),
        }
    }

    pub fn kind(&self) -> TransportEventKind {
        self.kind
    }

    /// Token the transport keeps to tell whether the handle is still alive.
    pub fn liveness(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn remove(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// One registered handler as a transport stores it.
#[derive(Debug, Clone)]
pub struct Sink {
    pub kind: TransportEventKind,
    pub inbox: EventInbox,
    pub liveness: CancellationToken,
}

impl Sink {
    pub fn is_live(&self) -> bool {
        !self.liveness.is_cancelled() && !self.inbox.is_closed()
    }
}

/// Routes `event` to every live sink registered for its kind and forgets
/// the dead ones.
pub fn publish(sinks: &mut Vec<Sink>, event: &TransportEvent) {
    sinks.retain(Sink::is_live);
    let kind = event.kind();
    for sink in sinks.iter().filter(|sink| sink.kind == kind) {
        let _ = sink.inbox.send(event.clone());
    }
}

/// Async peripheral transport consumed by the core.
#[async_trait]
pub trait PeripheralTransport: Send + Sync + 'static {
    async fn initialize(&self) -> Result<(), TransportError>;

    async fn adapter_state(&self) -> AdapterState;

    /// Asks the platform to power the adapter on. Platforms that forbid this
    /// return `Ok(())` without doing anything.
    async fn request_enable(&self) -> Result<(), TransportError>;

    /// Starts a timed scan. The transport emits `ScanStopped` when it ends.
    async fn start_scan(&self, request: &ScanRequest) -> Result<(), TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError>;

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError>;

    async fn discover_services(&self, id: &PeripheralId) -> Result<ServiceTree, TransportError>;

    async fn read_rssi(&self, id: &PeripheralId) -> Result<i16, TransportError>;

    async fn read_descriptor(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Vec<u8>, TransportError>;

    async fn read(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, TransportError>;

    /// Writes `data`, split by the transport into chunks of at most `max_packet_size` bytes.
    async fn write(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
        max_packet_size: usize,
    ) -> Result<(), TransportError>;

    async fn start_notification(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError>;

    /// Registers a handler for one event kind, delivering into `inbox`.
    fn subscribe(&self, kind: TransportEventKind, inbox: EventInbox) -> Subscription;
}
