//! Service registry.
//!
//! Maps discovered service UUIDs to the sensor driver responsible for them
//! and builds that driver through strict characteristic discovery.

use btleplug::api::{Characteristic, Service};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::ble::transport::GattPeripheral;
use crate::ble::uuids::{BATTERY_SERVICE_UUID, TEMPERATURE_SERVICE_UUID};
use crate::error::{Error, Result};
use crate::sensors::{BatterySensor, Sensor, SensorKind, TemperatureSensor};

/// Services this driver recognizes.
const SERVICE_TABLE: &[(Uuid, SensorKind)] = &[
    (BATTERY_SERVICE_UUID, SensorKind::Battery),
    (TEMPERATURE_SERVICE_UUID, SensorKind::Temperature),
];

/// Lookup table from service UUID to sensor driver.
pub struct ServiceRegistry;

impl ServiceRegistry {
    /// Find the sensor type for a service UUID.
    pub fn lookup(uuid: &Uuid) -> Option<SensorKind> {
        SERVICE_TABLE
            .iter()
            .find(|(service, _)| service == uuid)
            .map(|(_, kind)| *kind)
    }

    /// Check if a service UUID is recognized.
    pub fn is_recognized(uuid: &Uuid) -> bool {
        Self::lookup(uuid).is_some()
    }

    /// All recognized service UUIDs.
    pub fn recognized_services() -> impl Iterator<Item = Uuid> {
        SERVICE_TABLE.iter().map(|(uuid, _)| *uuid)
    }

    /// Build the driver for a discovered service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownService`] for an unrecognized service, and
    /// propagates discovery errors unmodified.
    pub async fn build_driver<P: GattPeripheral>(
        peripheral: &Arc<P>,
        service: &Service,
    ) -> Result<Sensor<P>> {
        let kind = Self::lookup(&service.uuid).ok_or_else(|| Error::UnknownService {
            uuid: service.uuid.to_string(),
        })?;

        debug!("Building {} driver for service {}", kind, service.uuid);

        let sensor = match kind {
            SensorKind::Battery => {
                Sensor::Battery(BatterySensor::discover(peripheral.clone(), service).await?)
            }
            SensorKind::Temperature => Sensor::Temperature(
                TemperatureSensor::discover(peripheral.clone(), service).await?,
            ),
        };

        Ok(sensor)
    }
}

/// Discover the characteristics of `service`, rejecting any outside `expected`.
pub(crate) async fn discover_characteristics_strict<P: GattPeripheral>(
    peripheral: &P,
    service: &Service,
    expected: &[Uuid],
) -> Result<HashMap<Uuid, Characteristic>> {
    let characteristics = peripheral
        .discover_characteristics(expected, service)
        .await?;

    let mut found = HashMap::with_capacity(characteristics.len());
    for characteristic in characteristics {
        if !expected.contains(&characteristic.uuid) {
            return Err(Error::UnknownCharacteristic {
                service: service.uuid.to_string(),
                uuid: characteristic.uuid.to_string(),
            });
        }

        debug!(
            "Found characteristic: {} in service {}",
            characteristic.uuid, service.uuid
        );
        found.insert(characteristic.uuid, characteristic);
    }

    Ok(found)
}

/// Remove a required characteristic from a discovery result.
pub(crate) fn take_required(
    found: &mut HashMap<Uuid, Characteristic>,
    service: &Service,
    uuid: Uuid,
) -> Result<Characteristic> {
    found
        .remove(&uuid)
        .ok_or_else(|| Error::MissingCharacteristic {
            service: service.uuid.to_string(),
            uuid: uuid.to_string(),
        })
}
