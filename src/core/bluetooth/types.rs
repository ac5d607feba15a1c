//! Defines shared data structures for the Bluetooth module.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::constants::UNKNOWN_PERIPHERAL_NAME;
use crate::core::bluetooth::error::FailureReason;

/// Transport-assigned unique identifier of a peripheral.
///
/// This is the platform id (a MAC address on Android/Linux, a UUID on iOS/macOS).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeripheralId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle status of a single peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Discovered,
    Connecting,
    Connected,
    ServicesResolving,
    Ready,
    Disconnecting,
    Disconnected,
    Failed(FailureReason),
}

impl ConnectionStatus {
    /// Whether a new connection attempt may start from this status.
    pub fn is_connectable(&self) -> bool {
        matches!(self, Self::Discovered | Self::Disconnected | Self::Failed(_))
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => f.write_str("discovered"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::ServicesResolving => f.write_str("resolving services"),
            Self::Ready => f.write_str("ready"),
            Self::Disconnecting => f.write_str("disconnecting"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Represents a known Bluetooth peripheral
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peripheral {
    /// Platform-specific unique identifier, fixed for the lifetime of the record
    id: PeripheralId,
    /// The advertised name, or the "no name" sentinel
    name: String,
    /// The last measured signal strength (RSSI)
    rssi: Option<i16>,
    /// Where this peripheral is in its connection lifecycle
    status: ConnectionStatus,
    /// Service UUIDs carried in the advertisement, used only for filtering
    service_hints: Vec<Uuid>,
}

impl Peripheral {
    /// Creates a freshly discovered peripheral with the sentinel name.
    pub fn new(id: impl Into<PeripheralId>) -> Self {
        Self {
            id: id.into(),
            name: UNKNOWN_PERIPHERAL_NAME.to_string(),
            rssi: None,
            status: ConnectionStatus::Discovered,
            service_hints: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn with_status(mut self, status: ConnectionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_service_hints(mut self, hints: Vec<Uuid>) -> Self {
        self.service_hints = hints;
        self
    }

    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn service_hints(&self) -> &[Uuid] {
        &self.service_hints
    }

    /// Returns true if the advertisement listed the given service
    pub fn advertises(&self, service: Uuid) -> bool {
        self.service_hints.contains(&service)
    }

    pub(crate) fn set_rssi(&mut self, rssi: i16) {
        self.rssi = Some(rssi);
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    /// Merges a newer record for the same id into this one.
    ///
    /// Advertisement fields always take the incoming values (RSSI only when
    /// measured). A `Discovered` status on the incoming record is not a
    /// status change and never replaces the current one.
    pub(crate) fn merge(&mut self, incoming: Peripheral) {
        self.name = incoming.name;
        if incoming.rssi.is_some() {
            self.rssi = incoming.rssi;
        }
        self.service_hints = incoming.service_hints;
        if incoming.status != ConnectionStatus::Discovered {
            self.status = incoming.status;
        }
    }
}

/// Advertisement payload reported by the transport for one discovery callback.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPeripheral {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub service_hints: Vec<Uuid>,
}

impl DiscoveredPeripheral {
    pub fn new(id: impl Into<PeripheralId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            rssi: None,
            service_hints: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn with_service_hints(mut self, hints: Vec<Uuid>) -> Self {
        self.service_hints = hints;
        self
    }

    /// Converts the advertisement into a registry record, filling in the
    /// sentinel name when the advertisement carries none.
    pub fn into_peripheral(self) -> Peripheral {
        let name = self
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_PERIPHERAL_NAME.to_string());
        let mut peripheral = Peripheral::new(self.id)
            .with_name(name)
            .with_service_hints(self.service_hints);
        if let Some(rssi) = self.rssi {
            peripheral = peripheral.with_rssi(rssi);
        }
        peripheral
    }
}

/// Resolved addressing for a Ready peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceBinding {
    pub peripheral_id: PeripheralId,
    pub service: Uuid,
    /// Characteristic written to
    pub transfer: Uuid,
    /// Characteristic read from and subscribed to
    pub receive: Uuid,
}

/// Result of GATT service discovery: services → characteristics → descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceTree {
    pub services: Vec<ServiceNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNode {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicNode {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

impl ServiceTree {
    pub fn new(services: Vec<ServiceNode>) -> Self {
        Self { services }
    }

    /// Iterates `(service, characteristic)` pairs across the whole tree.
    pub fn characteristics(&self) -> impl Iterator<Item = (Uuid, &CharacteristicNode)> {
        self.services.iter().flat_map(|service| {
            service
                .characteristics
                .iter()
                .map(move |characteristic| (service.uuid, characteristic))
        })
    }

    pub fn has_characteristics(&self) -> bool {
        self.characteristics().next().is_some()
    }

    pub fn contains_service(&self, uuid: Uuid) -> bool {
        self.services.iter().any(|service| service.uuid == uuid)
    }
}

impl ServiceNode {
    pub fn new(uuid: Uuid, characteristics: Vec<CharacteristicNode>) -> Self {
        Self { uuid, characteristics }
    }
}

impl CharacteristicNode {
    pub fn new(uuid: Uuid, descriptors: Vec<Uuid>) -> Self {
        Self { uuid, descriptors }
    }
}

/// Power state reported by the local adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    PoweredOn,
    PoweredOff,
    Unknown,
}

/// Scan-session state of the scan controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMatchMode {
    Aggressive,
    #[default]
    Sticky,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    Opportunistic,
    LowPower,
    Balanced,
    #[default]
    LowLatency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanCallbackType {
    #[default]
    AllMatches,
    FirstMatch,
    MatchLost,
}

/// Platform scan tuning passed through to the transport untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub match_mode: ScanMatchMode,
    pub scan_mode: ScanMode,
    pub callback_type: ScanCallbackType,
}

/// A timed discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// Only report peripherals advertising one of these services; empty means all
    pub service_filter: Vec<Uuid>,
    pub duration: Duration,
    /// Report every advertisement, not just the first per peripheral
    pub allow_duplicates: bool,
    pub options: ScanOptions,
}

/// Value pushed by a peripheral on a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacteristicUpdate {
    pub peripheral_id: PeripheralId,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub value: Vec<u8>,
}

/// Asynchronous callbacks delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Discovered(DiscoveredPeripheral),
    ScanStopped,
    Connected(PeripheralId),
    Disconnected(PeripheralId),
    CharacteristicUpdated(CharacteristicUpdate),
}

impl TransportEvent {
    pub fn kind(&self) -> TransportEventKind {
        match self {
            Self::Discovered(_) => TransportEventKind::Discover,
            Self::ScanStopped => TransportEventKind::ScanStop,
            Self::Connected(_) => TransportEventKind::Connect,
            Self::Disconnected(_) => TransportEventKind::Disconnect,
            Self::CharacteristicUpdated(_) => TransportEventKind::CharacteristicUpdate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEventKind {
    Discover,
    ScanStop,
    Connect,
    Disconnect,
    CharacteristicUpdate,
}

impl TransportEventKind {
    pub const ALL: [TransportEventKind; 5] = [
        Self::Discover,
        Self::ScanStop,
        Self::Connect,
        Self::Disconnect,
        Self::CharacteristicUpdate,
    ];
}

/// Read-only view of the session handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Known peripherals in discovery order
    pub peripherals: Vec<Peripheral>,
    pub binding: Option<ServiceBinding>,
    pub is_scanning: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovered_without_name_gets_sentinel() {
        let peripheral = DiscoveredPeripheral::new("AA:BB").with_rssi(-60).into_peripheral();
        assert_eq!(peripheral.name(), UNKNOWN_PERIPHERAL_NAME);
        assert_eq!(peripheral.rssi(), Some(-60));
        assert_eq!(peripheral.status(), &ConnectionStatus::Discovered);
    }

    #[test]
    fn empty_advertised_name_counts_as_missing() {
        let peripheral = DiscoveredPeripheral::new("AA:BB").with_name("").into_peripheral();
        assert_eq!(peripheral.name(), UNKNOWN_PERIPHERAL_NAME);
    }

    #[test]
    fn merge_keeps_advanced_status_and_measured_rssi() {
        let mut current = Peripheral::new("AA:BB")
            .with_rssi(-70)
            .with_status(ConnectionStatus::Ready);
        current.merge(Peripheral::new("AA:BB").with_name("Sensor"));

        assert_eq!(current.name(), "Sensor");
        assert_eq!(current.rssi(), Some(-70));
        assert_eq!(current.status(), &ConnectionStatus::Ready);
    }

    #[test]
    fn service_tree_walks_all_characteristics() {
        let service = Uuid::from_u128(1);
        let tree = ServiceTree::new(vec![
            ServiceNode::new(service, vec![CharacteristicNode::new(Uuid::from_u128(2), vec![])]),
            ServiceNode::new(Uuid::from_u128(3), vec![]),
        ]);

        assert!(tree.has_characteristics());
        assert!(tree.contains_service(service));
        assert_eq!(tree.characteristics().count(), 1);
        assert!(!ServiceTree::default().has_characteristics());
    }

    #[test]
    fn status_display_includes_failure_reason() {
        let status = ConnectionStatus::Failed(FailureReason::NoServices);
        assert_eq!(status.to_string(), "failed (no-services)");
    }
}
