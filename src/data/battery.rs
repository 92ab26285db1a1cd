//! Battery level reading.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Remaining battery charge as reported by the Battery Service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryLevel {
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Percentage remaining, passed through unscaled (0-255).
    pub percentage: u8,
}

impl BatteryLevel {
    /// Decode a Battery Level characteristic value.
    ///
    /// Only the first byte is used.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let percentage = *data.first().ok_or_else(|| Error::InvalidData {
            context: "empty battery level payload".to_string(),
        })?;

        Ok(Self {
            timestamp: Utc::now(),
            percentage,
        })
    }
}
