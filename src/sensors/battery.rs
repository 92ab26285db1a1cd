//! Battery level sensor.

use async_trait::async_trait;
use btleplug::api::{Characteristic, Service};
use std::sync::Arc;
use tracing::debug;

use crate::ble::transport::GattPeripheral;
use crate::ble::uuids::BATTERY_LEVEL_UUID;
use crate::data::BatteryLevel;
use crate::error::Result;
use crate::registry::{discover_characteristics_strict, take_required};
use crate::sensors::{SensorDriver, SensorKind};

/// Driver for the standard Battery Service.
pub struct BatterySensor<P: GattPeripheral> {
    peripheral: Arc<P>,
    service: Service,
    level: Characteristic,
}

impl<P: GattPeripheral> BatterySensor<P> {
    /// Discover the Battery Level characteristic.
    pub(crate) async fn discover(peripheral: Arc<P>, service: &Service) -> Result<Self> {
        let mut found =
            discover_characteristics_strict(&*peripheral, service, &[BATTERY_LEVEL_UUID]).await?;
        let level = take_required(&mut found, service, BATTERY_LEVEL_UUID)?;

        debug!("Battery sensor ready on {}", peripheral.id());

        Ok(Self {
            peripheral,
            service: service.clone(),
            level,
        })
    }

    /// Read the remaining battery percentage.
    pub async fn remaining(&self) -> Result<u8> {
        Ok(self.read().await?.percentage)
    }

    /// The service this driver was built from.
    pub fn service(&self) -> &Service {
        &self.service
    }
}

#[async_trait]
impl<P: GattPeripheral> SensorDriver for BatterySensor<P> {
    type Reading = BatteryLevel;

    fn kind(&self) -> SensorKind {
        SensorKind::Battery
    }

    async fn read_value(&self) -> Result<Vec<u8>> {
        debug!("Getting data value from battery monitor");
        self.peripheral.read(&self.level).await
    }

    fn decode(&self, data: &[u8]) -> Result<BatteryLevel> {
        BatteryLevel::parse(data)
    }
}

impl<P: GattPeripheral> std::fmt::Debug for BatterySensor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatterySensor")
            .field("peripheral", &self.peripheral.id())
            .finish()
    }
}
