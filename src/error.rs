//! Error types for the cc2650-rust-ble crate.

use std::time::Duration;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// A transport operation failed.
    #[error("Transport error during {operation}: {reason}")]
    Transport {
        /// The operation that failed (e.g. "read", "connect").
        operation: String,
        /// Description of the failure.
        reason: String,
    },

    /// The local radio did not power on within the deadline.
    #[error("Bluetooth radio did not power on within {timeout:?}")]
    PowerOnTimeout {
        /// The configured deadline.
        timeout: Duration,
    },

    /// No peripheral advertising the target name was seen within the deadline.
    #[error("Could not find {target} within {timeout:?}")]
    ScanTimeout {
        /// Advertised name that was searched for.
        target: String,
        /// The configured deadline.
        timeout: Duration,
    },

    /// The target peripheral was found but not connected and discovered within the deadline.
    #[error("Could not connect to {target} within {timeout:?}")]
    ConnectTimeout {
        /// Advertised name that was searched for.
        target: String,
        /// The configured deadline.
        timeout: Duration,
    },

    /// Discovery returned a service this driver does not recognize.
    #[error("Unknown service UUID: {uuid}")]
    UnknownService {
        /// The UUID of the unrecognized service.
        uuid: String,
    },

    /// Discovery returned a characteristic outside the expected set for its service.
    #[error("Unknown characteristic UUID {uuid} in service {service}")]
    UnknownCharacteristic {
        /// The owning service UUID.
        service: String,
        /// The UUID of the unrecognized characteristic.
        uuid: String,
    },

    /// A required characteristic was not returned by discovery.
    #[error("Characteristic {uuid} missing from service {service}")]
    MissingCharacteristic {
        /// The owning service UUID.
        service: String,
        /// The UUID of the missing characteristic.
        uuid: String,
    },

    /// A required descriptor was not returned by discovery.
    #[error("Descriptor {uuid} missing from characteristic {characteristic}")]
    MissingDescriptor {
        /// The owning characteristic UUID.
        characteristic: String,
        /// The UUID of the missing descriptor.
        uuid: String,
    },

    /// A connection is already live on this orchestrator.
    #[error("Already connected to {identifier}")]
    AlreadyConnected {
        /// Identifier of the live peripheral.
        identifier: String,
    },

    /// Operation requires a connection but none is live.
    #[error("Not connected")]
    NotConnected,

    /// The connection to the peripheral was lost.
    #[error("Connection lost")]
    ConnectionLost,

    /// Invalid data was received from the peripheral.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },
}

impl Error {
    /// Build a [`Error::Transport`] for the given operation.
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::PowerOnTimeout { .. } | Self::ScanTimeout { .. } | Self::ConnectTimeout { .. }
        )
    }

    /// Check if this error reports an identifier the driver does not recognize.
    pub fn is_unknown_identifier(&self) -> bool {
        matches!(
            self,
            Self::UnknownService { .. } | Self::UnknownCharacteristic { .. }
        )
    }

    /// Check if this error originates from the transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Bluetooth(_)
                | Self::BluetoothUnavailable
                | Self::Transport { .. }
                | Self::ConnectionLost
        )
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
