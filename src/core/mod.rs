//! Core functionality for the BLE demo
//! This module contains the peripheral lifecycle state machine and the
//! transports it runs on.

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, PeripheralTransport};
