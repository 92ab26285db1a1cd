//! BLE communication module.
//!
//! This module defines the transport boundary the driver consumes and its
//! btleplug implementation, plus the well-known SensorTag identifiers.

#[cfg(test)]
pub(crate) mod fake;
pub mod platform;
pub mod transport;
pub mod uuids;

pub use platform::{PlatformPeripheral, PlatformTransport};
pub use transport::{GattPeripheral, NotificationHandler, PowerState, Transport, TransportEvent};
pub use uuids::*;
