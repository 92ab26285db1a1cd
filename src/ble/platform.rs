//! btleplug-backed transport.
//!
//! Adapts the platform Bluetooth stack (CoreBluetooth, BlueZ, WinRT) to the
//! [`Transport`] and [`GattPeripheral`] traits.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Descriptor, Manager as _,
    Peripheral as _, ScanFilter, Service, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{
    GattPeripheral, NotificationHandler, PowerState, Transport, TransportEvent,
};
use crate::error::{Error, Result};

/// Interval between adapter state polls while waiting for power-on.
const POWER_POLL_INTERVAL: Duration = Duration::from_millis(200);

impl From<CentralState> for PowerState {
    fn from(state: CentralState) -> Self {
        match state {
            CentralState::PoweredOn => Self::PoweredOn,
            CentralState::PoweredOff => Self::PoweredOff,
            _ => Self::Unknown,
        }
    }
}

/// Whether a polled adapter state allows scanning.
///
/// Backends that cannot report their state count as ready. Any other query
/// failure ends the wait.
fn adapter_ready(state: std::result::Result<CentralState, btleplug::Error>) -> Result<bool> {
    match state {
        Ok(CentralState::PoweredOn) => Ok(true),
        Ok(state) => {
            debug!("Adapter state = {:?}, waiting", state);
            Ok(false)
        }
        Err(btleplug::Error::NotSupported(reason)) => {
            debug!("Adapter state not reported ({}), assuming powered on", reason);
            Ok(true)
        }
        Err(e) => {
            warn!("Failed to query adapter state: {}", e);
            Err(e.into())
        }
    }
}

/// Transport over the first Bluetooth adapter of the system.
pub struct PlatformTransport {
    /// The adapter, once powered on.
    adapter: RwLock<Option<Adapter>>,
}

impl PlatformTransport {
    /// Create a transport. The adapter is acquired by [`Transport::power_on`].
    pub fn new() -> Self {
        Self {
            adapter: RwLock::new(None),
        }
    }

    /// Create a transport over a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter: RwLock::new(Some(adapter)),
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> Result<Adapter> {
        self.adapter
            .read()
            .clone()
            .ok_or(Error::BluetoothUnavailable)
    }

    async fn open_adapter() -> Result<Adapter> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(adapter)
    }

    /// Translate a central event into a transport event.
    async fn translate(
        adapter: &Adapter,
        event: CentralEvent,
    ) -> Option<TransportEvent<PlatformPeripheral>> {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let peripheral = match adapter.peripheral(&id).await {
                    Ok(p) => p,
                    Err(e) => {
                        trace!("Failed to get peripheral: {}", e);
                        return None;
                    }
                };

                let properties = match peripheral.properties().await {
                    Ok(Some(p)) => p,
                    _ => return None,
                };

                Some(TransportEvent::PeripheralDiscovered {
                    peripheral: Arc::new(PlatformPeripheral::new(peripheral)),
                    local_name: properties.local_name,
                    rssi: properties.rssi,
                })
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
                Some(TransportEvent::PeripheralConnected { id: id.to_string() })
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
                Some(TransportEvent::PeripheralDisconnected { id: id.to_string() })
            }
            CentralEvent::StateUpdate(state) => Some(TransportEvent::StateChanged(state.into())),
            _ => None,
        }
    }
}

impl Default for PlatformTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for PlatformTransport {
    type Peripheral = PlatformPeripheral;

    async fn power_on(&self) -> Result<()> {
        let existing = self.adapter.read().clone();
        let adapter = match existing {
            Some(adapter) => adapter,
            None => Self::open_adapter().await?,
        };

        // CoreBluetooth reports Unknown for a moment after the manager is created.
        // The caller's deadline bounds this loop.
        while !adapter_ready(adapter.adapter_state().await)? {
            tokio::time::sleep(POWER_POLL_INTERVAL).await;
        }

        *self.adapter.write() = Some(adapter);
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, TransportEvent<PlatformPeripheral>>> {
        let adapter = self.adapter()?;
        let events = adapter.events().await?;

        Ok(events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move { Self::translate(&adapter, event).await }
            })
            .boxed())
    }

    async fn start_scan(&self) -> Result<()> {
        info!("Starting BLE scan");
        self.adapter()?.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        info!("Stopping BLE scan");
        self.adapter()?.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, peripheral: &PlatformPeripheral) -> Result<()> {
        peripheral.peripheral.connect().await?;
        Ok(())
    }

    async fn cancel_connection(&self, peripheral: &PlatformPeripheral) -> Result<()> {
        peripheral.peripheral.disconnect().await?;
        Ok(())
    }
}

/// A btleplug peripheral.
pub struct PlatformPeripheral {
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Notification forwarding tasks by characteristic UUID.
    listeners: Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>,
}

impl PlatformPeripheral {
    fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Get the btleplug peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }
}

impl std::fmt::Debug for PlatformPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformPeripheral")
            .field("id", &self.id())
            .finish()
    }
}

#[async_trait]
impl GattPeripheral for PlatformPeripheral {
    fn id(&self) -> String {
        self.peripheral.id().to_string()
    }

    async fn discover_services(&self) -> Result<Vec<Service>> {
        self.peripheral.discover_services().await?;

        let services: Vec<Service> = self.peripheral.services().into_iter().collect();
        debug!("Discovered {} services", services.len());

        Ok(services)
    }

    async fn discover_characteristics(
        &self,
        uuids: &[Uuid],
        service: &Service,
    ) -> Result<Vec<Characteristic>> {
        // btleplug populates characteristics during service discovery.
        let characteristics = service
            .characteristics
            .iter()
            .filter(|c| uuids.is_empty() || uuids.contains(&c.uuid))
            .cloned()
            .collect();

        Ok(characteristics)
    }

    async fn discover_descriptors(
        &self,
        uuids: &[Uuid],
        characteristic: &Characteristic,
    ) -> Result<Vec<Descriptor>> {
        let descriptors = characteristic
            .descriptors
            .iter()
            .filter(|d| uuids.is_empty() || uuids.contains(&d.uuid))
            .cloned()
            .collect();

        Ok(descriptors)
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        let data = self.peripheral.read(characteristic).await?;

        trace!(
            "Read {} bytes from characteristic {}",
            data.len(),
            characteristic.uuid
        );

        Ok(data)
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        write_type: WriteType,
    ) -> Result<()> {
        self.peripheral
            .write(characteristic, data, write_type)
            .await?;

        trace!(
            "Wrote {} bytes to characteristic {}",
            data.len(),
            characteristic.uuid
        );

        Ok(())
    }

    async fn write_descriptor(&self, descriptor: &Descriptor, data: &[u8]) -> Result<()> {
        self.peripheral.write_descriptor(descriptor, data).await?;

        trace!("Wrote {} bytes to descriptor {}", data.len(), descriptor.uuid);

        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        handler: NotificationHandler,
    ) -> Result<()> {
        debug!(
            "Subscribing to {}, properties: {:?}",
            characteristic.uuid, characteristic.properties
        );

        self.peripheral.subscribe(characteristic).await?;
        let mut notifications = self.peripheral.notifications().await?;

        let uuid = characteristic.uuid;
        let handle = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != uuid {
                    continue;
                }

                trace!(
                    "Notification received from {}: {:02X?}",
                    notification.uuid,
                    notification.value
                );

                handler(Ok(notification.value));
            }

            debug!("Notification stream for {} ended", uuid);
            handler(Err(Error::ConnectionLost));
        });

        let previous = self.listeners.lock().insert(uuid, handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()> {
        let listener = self.listeners.lock().remove(&characteristic.uuid);
        if let Some(handle) = listener {
            handle.abort();
        }

        self.peripheral.unsubscribe(characteristic).await?;

        debug!("Unsubscribed from notifications from {}", characteristic.uuid);

        Ok(())
    }
}

impl Drop for PlatformPeripheral {
    fn drop(&mut self) {
        for (_, handle) in self.listeners.lock().drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state_from_central_state() {
        assert_eq!(PowerState::from(CentralState::PoweredOn), PowerState::PoweredOn);
        assert_eq!(PowerState::from(CentralState::PoweredOff), PowerState::PoweredOff);
        assert_eq!(PowerState::from(CentralState::Unknown), PowerState::Unknown);
    }

    #[test]
    fn test_adapter_ready() {
        assert!(adapter_ready(Ok(CentralState::PoweredOn)).unwrap());
        assert!(!adapter_ready(Ok(CentralState::PoweredOff)).unwrap());
        assert!(!adapter_ready(Ok(CentralState::Unknown)).unwrap());
        assert!(adapter_ready(Err(btleplug::Error::NotSupported("state".into()))).unwrap());
    }

    #[test]
    fn test_adapter_state_error_is_surfaced() {
        let result = adapter_ready(Err(btleplug::Error::DeviceNotFound));
        assert!(matches!(result, Err(Error::Bluetooth(_))));
    }

    #[test]
    fn test_adapter_missing_before_power_on() {
        let transport = PlatformTransport::new();
        assert!(matches!(
            transport.adapter(),
            Err(Error::BluetoothUnavailable)
        ));
    }
}
