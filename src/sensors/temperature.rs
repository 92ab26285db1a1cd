//! TMP007 IR temperature sensor.
//!
//! The sensor is off after connection. Call [`StreamingSensor::enable`]
//! before reading; the first measurement is available roughly one period
//! later.

use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Descriptor, Service, WriteType};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ble::transport::{GattPeripheral, NotificationHandler};
use crate::ble::uuids::{
    CLIENT_CHARACTERISTIC_CONFIG_UUID, TEMPERATURE_CONFIG_UUID, TEMPERATURE_DATA_UUID,
    TEMPERATURE_PERIOD_UUID,
};
use crate::callback::CallbackHandle;
use crate::data::TemperatureReading;
use crate::error::{Error, Result};
use crate::pipeline::{NotificationPipeline, NotificationStream};
use crate::registry::{discover_characteristics_strict, take_required};
use crate::sensors::{SensorDriver, SensorKind, StreamingSensor};

/// CCCD value that enables notifications.
const NOTIFICATIONS_ON: [u8; 2] = [0x01, 0x00];

/// Shortest measurement period the sensor accepts.
pub const MIN_PERIOD: Duration = Duration::from_millis(300);
/// Longest measurement period the sensor accepts.
pub const MAX_PERIOD: Duration = Duration::from_millis(2550);
/// Period register resolution.
const PERIOD_UNIT_MS: u64 = 10;

/// Driver for the IR temperature service.
pub struct TemperatureSensor<P: GattPeripheral> {
    peripheral: Arc<P>,
    service: Service,
    data: Characteristic,
    configuration: Characteristic,
    period: Option<Characteristic>,
    notification_descriptor: Option<Descriptor>,
    /// Last configuration value written successfully.
    enabled: RwLock<Option<bool>>,
    /// Active notification pipeline.
    pipeline: Mutex<Option<NotificationPipeline<TemperatureReading>>>,
    /// Serializes configuration writes and subscription changes.
    config_lock: tokio::sync::Mutex<()>,
    callback_counter: AtomicU64,
}

impl<P: GattPeripheral> TemperatureSensor<P> {
    /// Discover the data, configuration and period characteristics and the
    /// notification descriptor of the data characteristic.
    pub(crate) async fn discover(peripheral: Arc<P>, service: &Service) -> Result<Self> {
        let mut found = discover_characteristics_strict(
            &*peripheral,
            service,
            &[
                TEMPERATURE_DATA_UUID,
                TEMPERATURE_CONFIG_UUID,
                TEMPERATURE_PERIOD_UUID,
            ],
        )
        .await?;

        let data = take_required(&mut found, service, TEMPERATURE_DATA_UUID)?;
        let configuration = take_required(&mut found, service, TEMPERATURE_CONFIG_UUID)?;
        let period = found.remove(&TEMPERATURE_PERIOD_UUID);

        let notification_descriptor = peripheral
            .discover_descriptors(&[CLIENT_CHARACTERISTIC_CONFIG_UUID], &data)
            .await?
            .into_iter()
            .find(|d| d.uuid == CLIENT_CHARACTERISTIC_CONFIG_UUID);

        if notification_descriptor.is_none() {
            debug!("IR temperature data characteristic has no notification descriptor");
        }

        debug!("IR temperature sensor ready on {}", peripheral.id());

        Ok(Self {
            peripheral,
            service: service.clone(),
            data,
            configuration,
            period,
            notification_descriptor,
            enabled: RwLock::new(None),
            pipeline: Mutex::new(None),
            config_lock: tokio::sync::Mutex::new(()),
            callback_counter: AtomicU64::new(0),
        })
    }

    /// Read ambient and IR temperatures.
    pub async fn temperatures(&self) -> Result<TemperatureReading> {
        self.read().await
    }

    /// Last configuration value written, or `None` if never written.
    pub fn is_enabled(&self) -> Option<bool> {
        *self.enabled.read()
    }

    /// Check if a notification stream is active.
    pub fn is_subscribed(&self) -> bool {
        self.pipeline
            .lock()
            .as_ref()
            .map(|p| !p.is_cancelled())
            .unwrap_or(false)
    }

    /// Set the measurement period (300 ms to 2550 ms, 10 ms resolution).
    pub async fn set_period(&self, period: Duration) -> Result<()> {
        if !(MIN_PERIOD..=MAX_PERIOD).contains(&period) {
            return Err(Error::InvalidParameter {
                name: "period".to_string(),
                value: format!("{:?}", period),
            });
        }

        let characteristic = self.period_characteristic()?;
        let value = (period.as_millis() as u64 / PERIOD_UNIT_MS) as u8;

        let _guard = self.config_lock.lock().await;
        debug!("Setting IR temperature period to {:?}", period);
        self.peripheral
            .write(characteristic, &[value], WriteType::WithResponse)
            .await
    }

    /// Read the measurement period.
    pub async fn read_period(&self) -> Result<Duration> {
        let data = self.peripheral.read(self.period_characteristic()?).await?;
        let value = *data.first().ok_or_else(|| Error::InvalidData {
            context: "empty period payload".to_string(),
        })?;

        Ok(Duration::from_millis(value as u64 * PERIOD_UNIT_MS))
    }

    /// Subscribe and invoke `callback` for every reading.
    ///
    /// The callback runs until the handle is dropped or the stream ends.
    pub async fn on_reading<F>(&self, callback: F) -> Result<CallbackHandle>
    where
        F: Fn(&TemperatureReading) + Send + Sync + 'static,
    {
        let mut stream = self.subscribe().await?;
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);

        let handle = tokio::spawn(async move {
            while let Some(reading) = stream.recv().await {
                callback(&reading);
            }
        });

        Ok(CallbackHandle::new(callback_id, handle))
    }

    /// The service this driver was built from.
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// End the active stream without transport I/O.
    pub(crate) fn cancel_notifications(&self) {
        let pipeline = self.pipeline.lock().take();
        if let Some(pipeline) = pipeline {
            pipeline.cancel();
        }
    }

    fn period_characteristic(&self) -> Result<&Characteristic> {
        self.period
            .as_ref()
            .ok_or_else(|| Error::MissingCharacteristic {
                service: self.service.uuid.to_string(),
                uuid: TEMPERATURE_PERIOD_UUID.to_string(),
            })
    }

    fn notification_handler(pipeline: NotificationPipeline<TemperatureReading>) -> NotificationHandler {
        Box::new(move |result| match result {
            Ok(data) => match TemperatureReading::parse(&data) {
                Ok(reading) => {
                    pipeline.push(reading);
                }
                Err(e) => debug!("Failed to parse temperature notification: {}", e),
            },
            Err(e) => warn!("IR temperature notification error: {}", e),
        })
    }
}

#[async_trait]
impl<P: GattPeripheral> SensorDriver for TemperatureSensor<P> {
    type Reading = TemperatureReading;

    fn kind(&self) -> SensorKind {
        SensorKind::Temperature
    }

    async fn read_value(&self) -> Result<Vec<u8>> {
        debug!("Getting data value from IR temperature sensor");
        self.peripheral.read(&self.data).await
    }

    fn decode(&self, data: &[u8]) -> Result<TemperatureReading> {
        TemperatureReading::parse(data)
    }
}

#[async_trait]
impl<P: GattPeripheral> StreamingSensor for TemperatureSensor<P> {
    async fn enable(&self, enabled: bool) -> Result<()> {
        let _guard = self.config_lock.lock().await;

        info!(
            "Turning {} IR temperature sensor",
            if enabled { "on" } else { "off" }
        );

        let value = u8::from(enabled);
        self.peripheral
            .write(&self.configuration, &[value], WriteType::WithResponse)
            .await?;

        *self.enabled.write() = Some(enabled);
        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream<TemperatureReading>> {
        let _guard = self.config_lock.lock().await;

        let descriptor =
            self.notification_descriptor
                .as_ref()
                .ok_or_else(|| Error::MissingDescriptor {
                    characteristic: self.data.uuid.to_string(),
                    uuid: CLIENT_CHARACTERISTIC_CONFIG_UUID.to_string(),
                })?;

        info!("Setting IR temperature notifications");
        self.peripheral
            .write_descriptor(descriptor, &NOTIFICATIONS_ON)
            .await?;

        let pipeline = NotificationPipeline::new();
        let stream = pipeline.stream();

        if self
            .data
            .properties
            .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
        {
            let handler = Self::notification_handler(pipeline.clone());
            self.peripheral.subscribe(&self.data, handler).await?;
        } else {
            warn!("IR temperature data characteristic does not support notifications");
        }

        let previous = self.pipeline.lock().replace(pipeline);
        if let Some(previous) = previous {
            previous.cancel();
        }

        Ok(stream)
    }

    async fn unsubscribe(&self) -> Result<()> {
        let _guard = self.config_lock.lock().await;

        let pipeline = self.pipeline.lock().take();
        let Some(pipeline) = pipeline else {
            return Ok(());
        };

        pipeline.cancel();
        info!("Removing IR temperature notifications");
        self.peripheral.unsubscribe(&self.data).await
    }
}

impl<P: GattPeripheral> std::fmt::Debug for TemperatureSensor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemperatureSensor")
            .field("peripheral", &self.peripheral.id())
            .field("enabled", &self.is_enabled())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}
