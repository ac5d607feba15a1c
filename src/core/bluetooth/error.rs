//! Error and outcome types for the peripheral lifecycle.
//!
//! `TransportError` is what the radio stack reports. `BleError` is what the
//! core returns to its callers: an adapter that cannot be used, a call that is
//! invalid for the current state, or a transport call that failed. Conditions
//! that never escape as errors live next to them: `FailureReason` is recorded
//! in `ConnectionStatus::Failed`, and `Degradation` records best-effort steps
//! that were skipped during an otherwise successful connection.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::bluetooth::types::{PeripheralId, ServiceBinding};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, BleError>;

/// Failures reported by a peripheral transport.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("Bluetooth transport is not initialized")]
    NotInitialized,

    #[error("No Bluetooth adapter available")]
    AdapterUnavailable,

    #[error("Peripheral not found: {0}")]
    UnknownPeripheral(PeripheralId),

    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("Descriptor not found: {0}")]
    DescriptorNotFound(Uuid),

    #[error("{0}")]
    Operation(String),
}

impl TransportError {
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }
}

/// Why the adapter cannot be used right now.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unavailability {
    #[error("Bluetooth is powered off, enable it to continue")]
    PoweredOff,

    #[error("Bluetooth could not be started: {0}")]
    NotInitialized(TransportError),
}

/// Calls that are invalid for the current state. No transport call was issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("connection to {0} is already in progress or already connected")]
    AlreadyInProgress(PeripheralId),

    #[error("peripheral {0} is not known")]
    UnknownPeripheral(PeripheralId),

    #[error("peripheral {0} is not ready")]
    NotReady(PeripheralId),
}

/// Errors returned by core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BleError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(Unavailability),

    #[error("Operation rejected: {0}")]
    OperationRejected(Rejection),

    #[error("Transport failure: {0}")]
    TransportFailure(#[from] TransportError),
}

impl BleError {
    /// True when the user must act (turn the adapter on) before retrying.
    pub fn needs_user_action(&self) -> bool {
        matches!(self, Self::TransportUnavailable(_))
    }

    pub(crate) fn powered_off() -> Self {
        Self::TransportUnavailable(Unavailability::PoweredOff)
    }

    pub(crate) fn not_ready(id: &PeripheralId) -> Self {
        Self::OperationRejected(Rejection::NotReady(id.clone()))
    }
}

/// Why a connection attempt ended in `ConnectionStatus::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Service discovery returned no characteristics; the peripheral is likely incompatible.
    #[error("no-services")]
    NoServices,

    #[error("{0}")]
    Transport(TransportError),
}

/// A best-effort step of the connection sequence that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Degradation {
    #[error("could not read RSSI: {0}")]
    RssiUnavailable(TransportError),

    #[error("could not read descriptor {descriptor} of {characteristic}: {error}")]
    DescriptorUnreadable {
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
        error: TransportError,
    },
}

/// Typed result of a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The peripheral reached `Ready` and its binding is published.
    Ready {
        binding: ServiceBinding,
        degradations: Vec<Degradation>,
    },
    /// The attempt ended in `Failed(reason)`.
    Failed(FailureReason),
    /// A disconnect superseded the attempt before it finished.
    Interrupted,
}

impl ConnectOutcome {
    pub fn binding(&self) -> Option<&ServiceBinding> {
        match self {
            Self::Ready { binding, .. } => Some(binding),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_converts_into_failure() {
        let err: BleError = TransportError::operation("GATT 133").into();
        assert_eq!(err, BleError::TransportFailure(TransportError::Operation("GATT 133".into())));
        assert!(!err.needs_user_action());
    }

    #[test]
    fn powered_off_needs_user_action() {
        let err = BleError::powered_off();
        assert!(err.needs_user_action());
        assert_eq!(
            err.to_string(),
            "Transport unavailable: Bluetooth is powered off, enable it to continue"
        );
    }

    #[test]
    fn rejection_message_names_the_peripheral() {
        let err = BleError::OperationRejected(Rejection::AlreadyInProgress("AA:BB".into()));
        assert_eq!(
            err.to_string(),
            "Operation rejected: connection to AA:BB is already in progress or already connected"
        );
    }
}
