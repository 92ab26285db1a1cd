// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # cc2650-rust-ble
//!
//! A cross-platform Rust driver for the TI CC2650 SensorTag over Bluetooth
//! Low Energy.
//!
//! The driver finds a SensorTag by its advertised name, connects, discovers
//! its GATT services and exposes typed sensors:
//!
//! - **Battery**: remaining battery percentage
//! - **IR temperature**: TMP007 ambient and object temperatures, as point
//!   reads or as a notification stream
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cc2650_rust_ble::{
//!     ConnectionOrchestrator, OrchestratorConfig, PlatformTransport, Result, StreamingSensor,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let orchestrator =
//!         ConnectionOrchestrator::new(PlatformTransport::new(), OrchestratorConfig::default());
//!
//!     let connection = orchestrator.connect_default().await?;
//!
//!     if let Some(battery) = connection.battery() {
//!         println!("Battery: {}%", battery.remaining().await?);
//!     }
//!
//!     if let Some(temperature) = connection.temperature() {
//!         temperature.enable(true).await?;
//!         let mut stream = temperature.subscribe().await?;
//!
//!         while let Some(reading) = stream.recv().await {
//!             println!("Ambient: {:.2}°C", reading.ambient.celsius());
//!         }
//!     }
//!
//!     connection.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Notification Delivery
//!
//! Streams hold at most one undelivered reading. A consumer slower than the
//! sensor period sees only the most recent value; older ones are dropped.
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for readings and configuration

// Public modules
pub mod ble;
pub mod callback;
pub mod config;
pub mod connection;
pub mod data;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod sensors;
pub mod signal;

// Re-exports for convenience
pub use ble::platform::{PlatformPeripheral, PlatformTransport};
pub use ble::transport::{GattPeripheral, PowerState, Transport, TransportEvent};
pub use ble::uuids::SENSOR_TAG_NAME;
pub use callback::CallbackHandle;
pub use config::{OrchestratorConfig, DEFAULT_TIMEOUT};
pub use connection::Connection;
pub use data::{celsius_to_fahrenheit, BatteryLevel, RawTemperature, Temperature, TemperatureReading};
pub use error::{Error, Result};
pub use orchestrator::{ConnectionOrchestrator, OrchestratorState, StateChange};
pub use pipeline::{NotificationPipeline, NotificationStream};
pub use registry::ServiceRegistry;
pub use sensors::{
    BatterySensor, Sensor, SensorDriver, SensorKind, StreamingSensor, TemperatureSensor,
};
pub use signal::CompletionSignal;
