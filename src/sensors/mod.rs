//! Sensor drivers.
//!
//! Each GATT service the driver recognizes maps to one sensor driver. All
//! drivers share the [`SensorDriver`] capability set; drivers that can stream
//! also implement [`StreamingSensor`].

use async_trait::async_trait;

use crate::ble::transport::GattPeripheral;
use crate::error::Result;
use crate::pipeline::NotificationStream;

pub mod battery;
pub mod temperature;

pub use battery::BatterySensor;
pub use temperature::TemperatureSensor;

/// Sensor type behind a recognized service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Battery Service.
    Battery,
    /// TMP007 IR temperature service.
    Temperature,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Battery => write!(f, "battery"),
            Self::Temperature => write!(f, "IR temperature"),
        }
    }
}

/// Point-read capability shared by all sensors.
#[async_trait]
pub trait SensorDriver: Send + Sync {
    /// Decoded reading type.
    type Reading: Send + 'static;

    /// The sensor type.
    fn kind(&self) -> SensorKind;

    /// Read the raw data characteristic.
    async fn read_value(&self) -> Result<Vec<u8>>;

    /// Decode a raw value. Pure, performs no I/O.
    fn decode(&self, data: &[u8]) -> Result<Self::Reading>;

    /// Read and decode.
    async fn read(&self) -> Result<Self::Reading> {
        let data = self.read_value().await?;
        self.decode(&data)
    }
}

/// Streaming capability for sensors that support notifications.
#[async_trait]
pub trait StreamingSensor: SensorDriver {
    /// Turn the sensor on or off.
    async fn enable(&self, enabled: bool) -> Result<()>;

    /// Arm notifications and return a stream of decoded readings.
    ///
    /// A previous stream from the same sensor ends.
    async fn subscribe(&self) -> Result<NotificationStream<Self::Reading>>;

    /// Remove the notification subscription. The current stream ends.
    async fn unsubscribe(&self) -> Result<()>;
}

/// A driver built by the [`ServiceRegistry`](crate::ServiceRegistry).
pub enum Sensor<P: GattPeripheral> {
    /// Battery level sensor.
    Battery(BatterySensor<P>),
    /// IR temperature sensor.
    Temperature(TemperatureSensor<P>),
}

impl<P: GattPeripheral> Sensor<P> {
    /// The sensor type.
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Battery(_) => SensorKind::Battery,
            Self::Temperature(_) => SensorKind::Temperature,
        }
    }
}

impl<P: GattPeripheral> std::fmt::Debug for Sensor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Sensor").field(&self.kind()).finish()
    }
}
