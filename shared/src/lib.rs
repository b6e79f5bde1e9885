pub mod affinity;
pub mod atomic_extension;
pub mod compute;
pub mod config;
pub mod driver;
pub mod error;
pub mod partition;
pub mod sink;
pub mod timing;
pub mod transfer;
pub mod transmit;
pub mod trigger;

/// Byte value the driver repeats to fill every transmission payload.
pub const PAYLOAD_BYTE: u8 = b'A';
