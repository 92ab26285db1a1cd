//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for SensorTag communication.

use uuid::Uuid;

/// Advertised local name of the SensorTag.
pub const SENSOR_TAG_NAME: &str = "CC2650 SensorTag";

/// TI base UUID (`f000xxxx-0451-4000-b000-000000000000`).
pub const TI_BASE_UUID: Uuid = Uuid::from_u128(0xf000_0000_0451_4000_b000_000000000000);

// Battery Service (Standard BLE)
/// Standard BLE Battery Service UUID.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_00805f9b34fb);
/// Battery Level characteristic UUID (Read).
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_00805f9b34fb);

// IR Temperature Service (TI TMP007)
/// IR Temperature Service UUID.
pub const TEMPERATURE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0xf000_aa00_0451_4000_b000_000000000000);
/// IR Temperature data characteristic UUID (Read, Notify).
pub const TEMPERATURE_DATA_UUID: Uuid = Uuid::from_u128(0xf000_aa01_0451_4000_b000_000000000000);
/// IR Temperature configuration characteristic UUID (Read, Write).
pub const TEMPERATURE_CONFIG_UUID: Uuid =
    Uuid::from_u128(0xf000_aa02_0451_4000_b000_000000000000);
/// IR Temperature period characteristic UUID (Read, Write).
pub const TEMPERATURE_PERIOD_UUID: Uuid =
    Uuid::from_u128(0xf000_aa03_0451_4000_b000_000000000000);

// Generic descriptors
/// Client Characteristic Configuration Descriptor UUID, used to arm notifications.
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

/// Build a UUID on the TI base from its 16-bit short form.
pub const fn ti_uuid(short: u16) -> Uuid {
    Uuid::from_u128(TI_BASE_UUID.as_u128() | ((short as u128) << 96))
}
