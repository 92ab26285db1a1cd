//! Transport boundary.
//!
//! The driver never talks to a BLE stack directly. It consumes a [`Transport`]
//! for radio-level operations (power, scanning, connections) and a
//! [`GattPeripheral`] for per-device GATT discovery and I/O. The
//! [`platform`](super::platform) module implements both over btleplug.

use async_trait::async_trait;
use btleplug::api::{Characteristic, Descriptor, Service, WriteType};
use futures::stream::BoxStream;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

/// Power state of the local radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PowerState {
    /// State not yet known.
    #[default]
    Unknown,
    /// Radio is on and usable.
    PoweredOn,
    /// Radio is off.
    PoweredOff,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::PoweredOn => write!(f, "PoweredOn"),
            Self::PoweredOff => write!(f, "PoweredOff"),
        }
    }
}

/// Event emitted by a [`Transport`].
///
/// Events are produced on the transport's own execution context.
#[derive(Debug)]
pub enum TransportEvent<P> {
    /// The radio changed power state.
    StateChanged(PowerState),
    /// A peripheral advertisement was observed.
    PeripheralDiscovered {
        /// Handle to the advertising peripheral.
        peripheral: Arc<P>,
        /// Advertised local name, if present.
        local_name: Option<String>,
        /// Signal strength in dBm.
        rssi: Option<i16>,
    },
    /// A connection to the peripheral completed.
    PeripheralConnected {
        /// Identifier of the connected peripheral.
        id: String,
    },
    /// The peripheral disconnected.
    PeripheralDisconnected {
        /// Identifier of the disconnected peripheral.
        id: String,
    },
}

impl<P> Clone for TransportEvent<P> {
    fn clone(&self) -> Self {
        match self {
            Self::StateChanged(state) => Self::StateChanged(*state),
            Self::PeripheralDiscovered {
                peripheral,
                local_name,
                rssi,
            } => Self::PeripheralDiscovered {
                peripheral: peripheral.clone(),
                local_name: local_name.clone(),
                rssi: *rssi,
            },
            Self::PeripheralConnected { id } => Self::PeripheralConnected { id: id.clone() },
            Self::PeripheralDisconnected { id } => Self::PeripheralDisconnected { id: id.clone() },
        }
    }
}

/// Callback invoked for every notification on a subscribed characteristic.
///
/// Receives the raw value, or the error the transport reported for it.
pub type NotificationHandler = Box<dyn Fn(Result<Vec<u8>>) + Send + Sync + 'static>;

/// Radio-level operations of a BLE central.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Peripheral handle type produced by this transport.
    type Peripheral: GattPeripheral;

    /// Open and power on the local radio.
    async fn power_on(&self) -> Result<()>;

    /// Stream of transport events.
    ///
    /// Each call returns an independent stream; events emitted before the
    /// call are not replayed.
    async fn events(&self) -> Result<BoxStream<'static, TransportEvent<Self::Peripheral>>>;

    /// Start scanning for advertisements.
    async fn start_scan(&self) -> Result<()>;

    /// Stop scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Request a connection. Completion is reported as
    /// [`TransportEvent::PeripheralConnected`].
    async fn connect(&self, peripheral: &Self::Peripheral) -> Result<()>;

    /// Cancel a connection. Completion is reported as
    /// [`TransportEvent::PeripheralDisconnected`].
    async fn cancel_connection(&self, peripheral: &Self::Peripheral) -> Result<()>;
}

/// GATT discovery and I/O on a connected peripheral.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GattPeripheral: Send + Sync + 'static {
    /// Platform identifier of the peripheral.
    fn id(&self) -> String;

    /// Discover all primary services.
    async fn discover_services(&self) -> Result<Vec<Service>>;

    /// Discover the characteristics of `service` whose UUID is in `uuids`.
    ///
    /// An empty filter requests every characteristic. Transports may return
    /// characteristics outside the filter.
    async fn discover_characteristics(
        &self,
        uuids: &[Uuid],
        service: &Service,
    ) -> Result<Vec<Characteristic>>;

    /// Discover the descriptors of `characteristic` whose UUID is in `uuids`.
    async fn discover_descriptors(
        &self,
        uuids: &[Uuid],
        characteristic: &Characteristic,
    ) -> Result<Vec<Descriptor>>;

    /// Read a characteristic value.
    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>>;

    /// Write a characteristic value.
    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        write_type: WriteType,
    ) -> Result<()>;

    /// Write a descriptor value.
    async fn write_descriptor(&self, descriptor: &Descriptor, data: &[u8]) -> Result<()>;

    /// Subscribe to notifications, installing `handler` for this characteristic.
    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        handler: NotificationHandler,
    ) -> Result<()>;

    /// Remove the subscription and its handler.
    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()>;
}
