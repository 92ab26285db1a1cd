//! Temperature data structures.
//!
//! Contains the raw 14-bit value reported by the TMP007 sensor and the
//! decoded ambient/IR reading pair.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Celsius per raw count.
pub const CELSIUS_PER_COUNT: f64 = 0.03125;

/// Convert Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use cc2650_rust_ble::celsius_to_fahrenheit;
///
/// let fahrenheit = celsius_to_fahrenheit(100.0);
/// assert!((fahrenheit - 212.0).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Raw temperature count from the TMP007 (14-bit).
///
/// Each 16-bit little-endian field in the sensor payload carries the count in
/// its upper 14 bits. The conversion formula is:
/// `temperature_celsius = raw_count * 0.03125`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawTemperature(u16);

impl RawTemperature {
    /// The maximum raw count (14-bit).
    pub const MAX_VALUE: u16 = 0x3FFF;

    /// Create a new RawTemperature, masking to 14 bits.
    pub fn new(value: u16) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    /// Extract the count from a 16-bit payload field.
    ///
    /// # Example
    ///
    /// ```
    /// use cc2650_rust_ble::data::RawTemperature;
    ///
    /// // 25.0°C = 800 counts, shifted left by 2 in the payload field
    /// let temp = RawTemperature::from_field(800 << 2);
    /// assert_eq!(temp.raw_value(), 800);
    /// assert_eq!(temp.to_celsius(), 25.0);
    /// ```
    pub fn from_field(field: u16) -> Self {
        Self::new(field >> 2)
    }

    /// Encode the count back into a 16-bit payload field.
    pub fn to_field(&self) -> u16 {
        self.0 << 2
    }

    /// Convert the raw count to Celsius.
    pub fn to_celsius(&self) -> f64 {
        self.0 as f64 * CELSIUS_PER_COUNT
    }

    /// Convert the raw count to Fahrenheit.
    pub fn to_fahrenheit(&self) -> f64 {
        celsius_to_fahrenheit(self.to_celsius())
    }

    /// Get the raw 14-bit count.
    pub fn raw_value(&self) -> u16 {
        self.0
    }
}

/// A single decoded temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Temperature {
    raw: RawTemperature,
}

impl Temperature {
    /// Create from a raw count.
    pub fn from_raw(raw: RawTemperature) -> Self {
        Self { raw }
    }

    /// The raw 14-bit count this temperature was decoded from.
    pub fn raw(&self) -> RawTemperature {
        self.raw
    }

    /// Temperature in degrees Celsius.
    pub fn celsius(&self) -> f64 {
        self.raw.to_celsius()
    }

    /// Temperature in degrees Fahrenheit, derived from Celsius.
    pub fn fahrenheit(&self) -> f64 {
        self.raw.to_fahrenheit()
    }
}

/// Ambient and IR (object) temperature pair from the IR temperature service.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemperatureReading {
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Die (ambient) temperature.
    pub ambient: Temperature,
    /// Object (IR) temperature.
    pub ir: Temperature,
}

impl TemperatureReading {
    /// Size of the sensor payload in bytes.
    pub const PAYLOAD_LEN: usize = 4;

    /// Decode a sensor payload.
    ///
    /// Bytes `[0:2)` hold the IR field and bytes `[2:4)` the ambient field,
    /// both little-endian. Extra trailing bytes are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::PAYLOAD_LEN {
            return Err(Error::InvalidData {
                context: format!(
                    "temperature payload is {} bytes, expected {}",
                    data.len(),
                    Self::PAYLOAD_LEN
                ),
            });
        }

        let ir_field = u16::from_le_bytes([data[0], data[1]]);
        let ambient_field = u16::from_le_bytes([data[2], data[3]]);

        Ok(Self {
            timestamp: Utc::now(),
            ambient: Temperature::from_raw(RawTemperature::from_field(ambient_field)),
            ir: Temperature::from_raw(RawTemperature::from_field(ir_field)),
        })
    }

    /// Encode back into the 4-byte sensor layout.
    pub fn to_bytes(&self) -> [u8; 4] {
        let ir = self.ir.raw().to_field().to_le_bytes();
        let ambient = self.ambient.raw().to_field().to_le_bytes();
        [ir[0], ir[1], ambient[0], ambient[1]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_celsius_to_fahrenheit() {
        assert!((celsius_to_fahrenheit(0.0) - 32.0).abs() < 0.001);
        assert!((celsius_to_fahrenheit(100.0) - 212.0).abs() < 0.001);
        assert!((celsius_to_fahrenheit(-40.0) - (-40.0)).abs() < 0.001);
    }

    #[test]
    fn test_raw_temperature_masks_to_14_bits() {
        assert_eq!(RawTemperature::new(0xFFFF).raw_value(), 0x3FFF);
        assert_eq!(RawTemperature::from_field(0xFFFF).raw_value(), 0x3FFF);
        assert_eq!(RawTemperature::from_field(0x0003).raw_value(), 0);
    }

    #[test]
    fn test_parse_known_payload() {
        // IR = 22.5°C (720 counts), ambient = 25.0°C (800 counts)
        let ir = (720u16 << 2).to_le_bytes();
        let ambient = (800u16 << 2).to_le_bytes();
        let data = [ir[0], ir[1], ambient[0], ambient[1]];

        let reading = TemperatureReading::parse(&data).unwrap();
        assert_eq!(reading.ir.raw().raw_value(), 720);
        assert_eq!(reading.ambient.raw().raw_value(), 800);
        assert!((reading.ir.celsius() - 22.5).abs() < 1e-9);
        assert!((reading.ambient.celsius() - 25.0).abs() < 1e-9);
        assert!((reading.ambient.fahrenheit() - 77.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_too_short() {
        let result = TemperatureReading::parse(&[0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(Error::InvalidData { .. })));
    }

    #[test]
    fn test_to_bytes_layout() {
        let data = [0x40, 0x0B, 0x80, 0x0C];
        let reading = TemperatureReading::parse(&data).unwrap();
        assert_eq!(reading.to_bytes(), data);
    }

    proptest! {
        #[test]
        fn prop_raw14_roundtrip(ambient in 0u16..=0x3FFF, ir in 0u16..=0x3FFF) {
            let a = (ambient << 2).to_le_bytes();
            let i = (ir << 2).to_le_bytes();
            let reading = TemperatureReading::parse(&[i[0], i[1], a[0], a[1]]).unwrap();

            prop_assert_eq!(reading.ambient.raw().raw_value(), ambient);
            prop_assert_eq!(reading.ir.raw().raw_value(), ir);
            prop_assert!((reading.ambient.celsius() - ambient as f64 * 0.03125).abs() < 1e-9);
            prop_assert!((reading.ir.celsius() - ir as f64 * 0.03125).abs() < 1e-9);
        }

        #[test]
        fn prop_decode_matches_formula(data in proptest::array::uniform4(any::<u8>())) {
            let reading = TemperatureReading::parse(&data).unwrap();
            let ambient = (u16::from_le_bytes([data[2], data[3]]) >> 2) & 0x3FFF;
            let ir = (u16::from_le_bytes([data[0], data[1]]) >> 2) & 0x3FFF;

            prop_assert_eq!(reading.ambient.raw().raw_value(), ambient);
            prop_assert_eq!(reading.ir.raw().raw_value(), ir);
        }
    }
}
