//! BLE peripheral demo library
//! The state-machine core behind a screen that scans for, connects to and
//! exchanges data with a BLE peripheral.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;

pub use crate::core::bluetooth::BluetoothManager;
pub use state::AppState;
