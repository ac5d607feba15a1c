//! Constants used throughout the application
//! This module contains all the constant values used in the application,
//! such as UUIDs, timeouts, and other configuration values.

use uuid::Uuid;

/// Display name given to peripherals that advertise without one
pub const UNKNOWN_PERIPHERAL_NAME: &str = "NO NAME";

/// The UUID of the demo peripheral's data service
pub const UUID_DEVICE_SERVICE: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// The UUID of the characteristic the demo writes to
pub const UUID_TRANSFER_CHAR: Uuid = Uuid::from_u128(0xbeb5483f_36e1_4688_b7f5_ea07361b26a9);

/// The UUID of the characteristic the demo reads from and subscribes to
pub const UUID_RECEIVE_CHAR: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 5;

/// Report every advertisement so RSSI keeps refreshing while scanning
pub const DEFAULT_ALLOW_DUPLICATES: bool = true;

/// Wait between the connect ack and service discovery, in milliseconds
pub const POST_CONNECT_SETTLE_MS: u64 = 900;

/// Wait between enabling notifications and writing, in milliseconds
pub const POST_SUBSCRIBE_SETTLE_MS: u64 = 900;

/// Largest chunk handed to a single characteristic write, in bytes
pub const DEFAULT_MAX_PACKET_SIZE: usize = 255;

/// Capacity of the notification and log broadcast channels
pub const BROADCAST_CAPACITY: usize = 64;
