//! Bluetooth functionality for the BLE demo
//! This module handles all bluetooth operations including scanning,
//! connecting, and exchanging data with a peripheral.

mod connection;
mod data_channel;
mod dispatcher;
mod manager;
mod registry;
mod scanner;
mod session;

pub mod constants;
pub mod error;
pub mod mock;
pub mod transport;
pub mod types;

#[cfg(feature = "bluest")]
mod bluest_transport;

// Re-export types that should be publicly accessible
pub use connection::ConnectionSequencer;
pub use constants::*; // Re-export all constants
pub use data_channel::DataChannel;
pub use dispatcher::{EventDispatcher, EventRouter};
pub use error::{
    BleError, ConnectOutcome, Degradation, FailureReason, Rejection, TransportError, Unavailability,
};
pub use manager::BluetoothManager;
pub use mock::{MockCall, MockOp, MockTransport};
pub use registry::Registry;
pub use scanner::{ScanController, ScanOutcome};
pub use session::{SequenceToken, SessionState, SharedSession};
pub use transport::{EventInbox, PeripheralTransport, Subscription};
pub use types::*;

#[cfg(feature = "bluest")]
pub use bluest_transport::BluestTransport;
