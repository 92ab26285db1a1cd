//! Data structures for sensor readings.
//!
//! Readings are value objects created fresh on every read or notification.

pub mod battery;
pub mod temperature;

pub use battery::BatteryLevel;
pub use temperature::{celsius_to_fahrenheit, RawTemperature, Temperature, TemperatureReading};
