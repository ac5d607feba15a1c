//! Mock peripheral transport for testing and development.
//!
//! `MockTransport` records every call made to it and answers from
//! programmable state: adapter power, the service tree returned by discovery,
//! per-operation failures, RSSI, unreadable descriptors and an artificial
//! discovery delay. Like a real stack it acknowledges successful connects,
//! disconnects and scan stops with the matching transport event. Tests can
//! also push arbitrary events with [`MockTransport::emit`].
//!
//! # Examples
//!
//! ```
//! use ble_peripheral_demo_lib::core::bluetooth::{MockCall, MockTransport, PeripheralTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = MockTransport::new();
//!     transport.connect(&"AA:BB".into()).await.unwrap();
//!     assert_eq!(transport.count(|call| matches!(call, MockCall::Connect(_))), 1);
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::error::TransportError;
use crate::core::bluetooth::transport::{
    EventInbox, PeripheralTransport, Sink, Subscription, publish,
};
use crate::core::bluetooth::types::{
    AdapterState, CharacteristicNode, PeripheralId, ScanRequest, ServiceNode, ServiceTree,
    TransportEvent, TransportEventKind,
};

/// A call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Initialize,
    AdapterState,
    RequestEnable,
    StartScan(ScanRequest),
    StopScan,
    Connect(PeripheralId),
    Disconnect(PeripheralId),
    DiscoverServices(PeripheralId),
    ReadRssi(PeripheralId),
    ReadDescriptor {
        id: PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    },
    Read {
        id: PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    },
    Write {
        id: PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: Vec<u8>,
        max_packet_size: usize,
    },
    StartNotification {
        id: PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    },
}

/// Operations whose result can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Initialize,
    RequestEnable,
    StartScan,
    StopScan,
    Connect,
    Disconnect,
    DiscoverServices,
    ReadRssi,
    Read,
    Write,
    StartNotification,
}

#[derive(Debug)]
struct MockState {
    adapter_state: AdapterState,
    service_tree: ServiceTree,
    rssi: i16,
    read_value: Vec<u8>,
    discovery_delay: Duration,
    failures: HashMap<MockOp, TransportError>,
    unreadable_descriptors: HashSet<Uuid>,
    calls: Vec<MockCall>,
    sinks: Vec<Sink>,
}

/// Mock transport. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A powered-on adapter whose peripherals expose `demo_service_tree()`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                adapter_state: AdapterState::PoweredOn,
                service_tree: demo_service_tree(),
                rssi: -55,
                read_value: Vec::new(),
                discovery_delay: Duration::ZERO,
                failures: HashMap::new(),
                unreadable_descriptors: HashSet::new(),
                calls: Vec::new(),
                sinks: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_adapter_state(&self, adapter_state: AdapterState) {
        self.state().adapter_state = adapter_state;
    }

    pub fn set_service_tree(&self, tree: ServiceTree) {
        self.state().service_tree = tree;
    }

    pub fn set_rssi(&self, rssi: i16) {
        self.state().rssi = rssi;
    }

    pub fn set_read_value(&self, value: impl Into<Vec<u8>>) {
        self.state().read_value = value.into();
    }

    /// Makes service discovery take `delay` before answering.
    pub fn set_discovery_delay(&self, delay: Duration) {
        self.state().discovery_delay = delay;
    }

    /// Makes every later call of `op` fail with `error`.
    pub fn fail(&self, op: MockOp, error: TransportError) {
        self.state().failures.insert(op, error);
    }

    pub fn clear_failure(&self, op: MockOp) {
        self.state().failures.remove(&op);
    }

    pub fn fail_descriptor(&self, descriptor: Uuid) {
        self.state().unreadable_descriptors.insert(descriptor);
    }

    /// Delivers `event` to every live handler registered for its kind.
    pub fn emit(&self, event: TransportEvent) {
        publish(&mut self.state().sinks, &event);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Calls other than adapter-state queries.
    pub fn transport_calls(&self) -> usize {
        self.count(|call| !matches!(call, MockCall::AdapterState))
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of registered handlers that have not been removed.
    pub fn active_subscriptions(&self) -> usize {
        let mut state = self.state();
        state.sinks.retain(Sink::is_live);
        state.sinks.len()
    }

    /// Records `call` and returns the forced failure for `op`, if any.
    fn record(&self, call: MockCall, op: Option<MockOp>) -> Result<(), TransportError> {
        let mut state = self.state();
        state.calls.push(call);
        match op.and_then(|op| state.failures.get(&op).cloned()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PeripheralTransport for MockTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        self.record(MockCall::Initialize, Some(MockOp::Initialize))
    }

    async fn adapter_state(&self) -> AdapterState {
        let mut state = self.state();
        state.calls.push(MockCall::AdapterState);
        state.adapter_state
    }

    async fn request_enable(&self) -> Result<(), TransportError> {
        self.record(MockCall::RequestEnable, Some(MockOp::RequestEnable))?;
        self.state().adapter_state = AdapterState::PoweredOn;
        Ok(())
    }

    async fn start_scan(&self, request: &ScanRequest) -> Result<(), TransportError> {
        self.record(MockCall::StartScan(request.clone()), Some(MockOp::StartScan))
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.record(MockCall::StopScan, Some(MockOp::StopScan))?;
        self.emit(TransportEvent::ScanStopped);
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        self.record(MockCall::Connect(id.clone()), Some(MockOp::Connect))?;
        self.emit(TransportEvent::Connected(id.clone()));
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        self.record(MockCall::Disconnect(id.clone()), Some(MockOp::Disconnect))?;
        self.emit(TransportEvent::Disconnected(id.clone()));
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<ServiceTree, TransportError> {
        self.record(MockCall::DiscoverServices(id.clone()), Some(MockOp::DiscoverServices))?;
        let delay = self.state().discovery_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state().service_tree.clone())
    }

    async fn read_rssi(&self, id: &PeripheralId) -> Result<i16, TransportError> {
        self.record(MockCall::ReadRssi(id.clone()), Some(MockOp::ReadRssi))?;
        Ok(self.state().rssi)
    }

    async fn read_descriptor(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(
            MockCall::ReadDescriptor {
                id: id.clone(),
                service,
                characteristic,
                descriptor,
            },
            None,
        )?;
        if self.state().unreadable_descriptors.contains(&descriptor) {
            return Err(TransportError::DescriptorNotFound(descriptor));
        }
        Ok(vec![0x01, 0x00])
    }

    async fn read(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(
            MockCall::Read {
                id: id.clone(),
                service,
                characteristic,
            },
            Some(MockOp::Read),
        )?;
        Ok(self.state().read_value.clone())
    }

    async fn write(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
        max_packet_size: usize,
    ) -> Result<(), TransportError> {
        self.record(
            MockCall::Write {
                id: id.clone(),
                service,
                characteristic,
                data: data.to_vec(),
                max_packet_size,
            },
            Some(MockOp::Write),
        )
    }

    async fn start_notification(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError> {
        self.record(
            MockCall::StartNotification {
                id: id.clone(),
                service,
                characteristic,
            },
            Some(MockOp::StartNotification),
        )
    }

    fn subscribe(&self, kind: TransportEventKind, inbox: EventInbox) -> Subscription {
        let subscription = Subscription::new(kind);
        self.state().sinks.push(Sink {
            kind,
            inbox,
            liveness: subscription.liveness(),
        });
        subscription
    }
}

/// The demo peripheral's GATT layout: the data service with its transfer and
/// receive characteristics, the receive one carrying a CCCD.
pub fn demo_service_tree() -> ServiceTree {
    use crate::core::bluetooth::constants::{UUID_DEVICE_SERVICE, UUID_RECEIVE_CHAR, UUID_TRANSFER_CHAR};

    ServiceTree::new(vec![ServiceNode::new(
        UUID_DEVICE_SERVICE,
        vec![
            CharacteristicNode::new(UUID_TRANSFER_CHAR, vec![]),
            CharacteristicNode::new(UUID_RECEIVE_CHAR, vec![UUID_CCCD]),
        ],
    )])
}

/// Client Characteristic Configuration Descriptor
pub const UUID_CCCD: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn forced_failure_is_returned_and_recorded() {
        let transport = MockTransport::new();
        transport.fail(MockOp::Connect, TransportError::operation("boom"));

        let result = transport.connect(&"A".into()).await;

        assert_eq!(result, Err(TransportError::operation("boom")));
        assert_eq!(transport.calls(), vec![MockCall::Connect("A".into())]);
    }

    #[tokio::test]
    async fn connect_is_acknowledged_with_event() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = transport.subscribe(TransportEventKind::Connect, tx);

        transport.connect(&"A".into()).await.unwrap();

        assert_eq!(rx.recv().await, Some(TransportEvent::Connected("A".into())));
    }

    #[tokio::test]
    async fn removed_subscription_is_not_counted() {
        let transport = MockTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let subscription = transport.subscribe(TransportEventKind::Discover, tx);
        assert_eq!(transport.active_subscriptions(), 1);

        subscription.remove();
        assert_eq!(transport.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn request_enable_powers_adapter_on() {
        let transport = MockTransport::new();
        transport.set_adapter_state(AdapterState::PoweredOff);

        transport.request_enable().await.unwrap();

        assert_eq!(transport.adapter_state().await, AdapterState::PoweredOn);
    }
}
