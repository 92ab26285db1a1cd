//! Orchestrator configuration.

use std::time::Duration;

use crate::ble::uuids::SENSOR_TAG_NAME;

/// Default deadline for each asynchronous wait point (5 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`ConnectionOrchestrator`](crate::ConnectionOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrchestratorConfig {
    /// Advertised local name to connect to (exact, case-sensitive).
    /// Default: `"CC2650 SensorTag"`.
    pub target_name: String,
    /// Deadline for the radio to power on. Default: 5 s.
    pub power_on_timeout: Duration,
    /// Deadline from scan start until all services are discovered, used by
    /// [`connect_default`](crate::ConnectionOrchestrator::connect_default).
    /// Default: 5 s.
    pub connect_timeout: Duration,
    /// Abort the connection when the peripheral exposes a service the driver
    /// does not recognize. Default: `false` (unrecognized services are skipped).
    pub strict_services: bool,
}

impl OrchestratorConfig {
    /// Set the advertised name to match.
    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = name.into();
        self
    }

    /// Set the power-on deadline.
    pub fn with_power_on_timeout(mut self, timeout: Duration) -> Self {
        self.power_on_timeout = timeout;
        self
    }

    /// Set the connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable strict service discovery.
    pub fn with_strict_services(mut self, strict: bool) -> Self {
        self.strict_services = strict;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            target_name: SENSOR_TAG_NAME.to_string(),
            power_on_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
            strict_services: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.target_name, "CC2650 SensorTag");
        assert_eq!(config.power_on_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(!config.strict_services);
    }

    #[test]
    fn test_builder() {
        let config = OrchestratorConfig::default()
            .with_target_name("Other Tag")
            .with_power_on_timeout(Duration::from_secs(1))
            .with_connect_timeout(Duration::from_secs(10))
            .with_strict_services(true);

        assert_eq!(
            config,
            OrchestratorConfig {
                target_name: "Other Tag".to_string(),
                power_on_timeout: Duration::from_secs(1),
                connect_timeout: Duration::from_secs(10),
                strict_services: true,
            }
        );
    }
}
