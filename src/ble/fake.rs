//! In-memory transport and peripheral for tests.

use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Descriptor, Service, WriteType};
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ble::transport::{
    GattPeripheral, NotificationHandler, Transport, TransportEvent,
};
use crate::ble::uuids::*;
use crate::error::{Error, Result};

/// Generic Access service, present on every real device.
pub const GENERIC_ACCESS_UUID: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
/// Device Name characteristic.
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);

pub fn characteristic(uuid: Uuid, service_uuid: Uuid, properties: CharPropFlags) -> Characteristic {
    Characteristic {
        uuid,
        service_uuid,
        properties,
        descriptors: BTreeSet::new(),
    }
}

fn service(uuid: Uuid, characteristics: Vec<Characteristic>) -> Service {
    Service {
        uuid,
        primary: true,
        characteristics: characteristics.into_iter().collect(),
    }
}

pub fn battery_level() -> Characteristic {
    characteristic(
        BATTERY_LEVEL_UUID,
        BATTERY_SERVICE_UUID,
        CharPropFlags::READ | CharPropFlags::NOTIFY,
    )
}

pub fn notification_descriptor() -> Descriptor {
    Descriptor {
        uuid: CLIENT_CHARACTERISTIC_CONFIG_UUID,
        service_uuid: TEMPERATURE_SERVICE_UUID,
        characteristic_uuid: TEMPERATURE_DATA_UUID,
    }
}

pub fn temperature_data() -> Characteristic {
    let mut data = characteristic(
        TEMPERATURE_DATA_UUID,
        TEMPERATURE_SERVICE_UUID,
        CharPropFlags::READ | CharPropFlags::NOTIFY,
    );
    data.descriptors.insert(notification_descriptor());
    data
}

pub fn temperature_config() -> Characteristic {
    characteristic(
        TEMPERATURE_CONFIG_UUID,
        TEMPERATURE_SERVICE_UUID,
        CharPropFlags::READ | CharPropFlags::WRITE,
    )
}

pub fn temperature_period() -> Characteristic {
    characteristic(
        TEMPERATURE_PERIOD_UUID,
        TEMPERATURE_SERVICE_UUID,
        CharPropFlags::READ | CharPropFlags::WRITE,
    )
}

pub fn battery_service() -> Service {
    service(BATTERY_SERVICE_UUID, vec![battery_level()])
}

pub fn temperature_service() -> Service {
    service(
        TEMPERATURE_SERVICE_UUID,
        vec![temperature_data(), temperature_config(), temperature_period()],
    )
}

pub fn generic_access_service() -> Service {
    service(
        GENERIC_ACCESS_UUID,
        vec![characteristic(
            DEVICE_NAME_UUID,
            GENERIC_ACCESS_UUID,
            CharPropFlags::READ,
        )],
    )
}

/// A peripheral backed by fixed services and an in-memory attribute table.
pub struct FakePeripheral {
    id: String,
    services: Vec<Service>,
    discovery_error: Option<String>,
    values: Mutex<HashMap<Uuid, Vec<u8>>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    descriptor_writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    handlers: Mutex<HashMap<Uuid, NotificationHandler>>,
}

impl FakePeripheral {
    /// A SensorTag exposing Generic Access, Battery and IR temperature.
    pub fn sensor_tag(id: &str) -> Self {
        Self::with_services(
            id,
            vec![
                generic_access_service(),
                battery_service(),
                temperature_service(),
            ],
        )
    }

    pub fn with_services(id: &str, services: Vec<Service>) -> Self {
        Self {
            id: id.to_string(),
            services,
            discovery_error: None,
            values: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            descriptor_writes: Mutex::new(Vec::new()),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Fail every discovery call with a transport error for `operation`.
    pub fn with_discovery_error(mut self, operation: &str) -> Self {
        self.discovery_error = Some(operation.to_string());
        self
    }

    pub fn set_value(&self, uuid: Uuid, value: Vec<u8>) {
        self.values.lock().insert(uuid, value);
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().clone()
    }

    pub fn descriptor_writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.descriptor_writes.lock().clone()
    }

    pub fn is_subscribed(&self, uuid: Uuid) -> bool {
        self.handlers.lock().contains_key(&uuid)
    }

    /// Deliver a notification to the handler subscribed on `uuid`.
    pub fn notify(&self, uuid: Uuid, data: Vec<u8>) {
        if let Some(handler) = self.handlers.lock().get(&uuid) {
            handler(Ok(data));
        }
    }

    fn check_discovery(&self) -> Result<()> {
        match &self.discovery_error {
            Some(operation) => Err(Error::transport(operation, "injected failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GattPeripheral for FakePeripheral {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn discover_services(&self) -> Result<Vec<Service>> {
        self.check_discovery()?;
        Ok(self.services.clone())
    }

    async fn discover_characteristics(
        &self,
        _uuids: &[Uuid],
        service: &Service,
    ) -> Result<Vec<Characteristic>> {
        self.check_discovery()?;
        Ok(service.characteristics.iter().cloned().collect())
    }

    async fn discover_descriptors(
        &self,
        uuids: &[Uuid],
        characteristic: &Characteristic,
    ) -> Result<Vec<Descriptor>> {
        self.check_discovery()?;
        Ok(characteristic
            .descriptors
            .iter()
            .filter(|d| uuids.is_empty() || uuids.contains(&d.uuid))
            .cloned()
            .collect())
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        self.values
            .lock()
            .get(&characteristic.uuid)
            .cloned()
            .ok_or_else(|| Error::transport("read", "no value"))
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        _write_type: WriteType,
    ) -> Result<()> {
        self.writes
            .lock()
            .push((characteristic.uuid, data.to_vec()));
        Ok(())
    }

    async fn write_descriptor(&self, descriptor: &Descriptor, data: &[u8]) -> Result<()> {
        self.descriptor_writes
            .lock()
            .push((descriptor.characteristic_uuid, data.to_vec()));
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        handler: NotificationHandler,
    ) -> Result<()> {
        self.handlers.lock().insert(characteristic.uuid, handler);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()> {
        self.handlers.lock().remove(&characteristic.uuid);
        Ok(())
    }
}

/// How [`FakeTransport::power_on`] behaves.
#[derive(Debug, Clone, Copy)]
pub enum PowerBehavior {
    Ready,
    Delay(Duration),
    Fail,
    Hang,
}

/// A transport that replays scripted advertisements.
pub struct FakeTransport {
    events: broadcast::Sender<TransportEvent<FakePeripheral>>,
    power: PowerBehavior,
    advertised: Vec<(Arc<FakePeripheral>, Option<String>)>,
    complete_connections: AtomicBool,
    fail_cancellation: AtomicBool,
    pub power_on_calls: AtomicUsize,
    pub scans_started: AtomicUsize,
    pub scans_stopped: AtomicUsize,
    pub connects: AtomicUsize,
    pub cancels: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            power: PowerBehavior::Ready,
            advertised: Vec::new(),
            complete_connections: AtomicBool::new(true),
            fail_cancellation: AtomicBool::new(false),
            power_on_calls: AtomicUsize::new(0),
            scans_started: AtomicUsize::new(0),
            scans_stopped: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        }
    }

    /// Advertise `peripheral` under `name` each time scanning starts.
    pub fn advertising(mut self, peripheral: Arc<FakePeripheral>, name: Option<&str>) -> Self {
        self.advertised
            .push((peripheral, name.map(str::to_string)));
        self
    }

    pub fn with_power(mut self, power: PowerBehavior) -> Self {
        self.power = power;
        self
    }

    /// Accept connect requests without ever reporting completion.
    pub fn without_connect_completion(self) -> Self {
        self.complete_connections.store(false, Ordering::SeqCst);
        self
    }

    /// Make `cancel_connection` fail and leave the link up.
    pub fn fail_cancellation(&self, fail: bool) {
        self.fail_cancellation.store(fail, Ordering::SeqCst);
    }

    pub fn emit(&self, event: TransportEvent<FakePeripheral>) {
        let _ = self.events.send(event);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Peripheral = FakePeripheral;

    async fn power_on(&self) -> Result<()> {
        self.power_on_calls.fetch_add(1, Ordering::SeqCst);
        match self.power {
            PowerBehavior::Ready => {}
            PowerBehavior::Delay(delay) => tokio::time::sleep(delay).await,
            PowerBehavior::Fail => return Err(Error::BluetoothUnavailable),
            PowerBehavior::Hang => futures::future::pending::<()>().await,
        }
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, TransportEvent<FakePeripheral>>> {
        let rx = self.events.subscribe();
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed())
    }

    async fn start_scan(&self) -> Result<()> {
        self.scans_started.fetch_add(1, Ordering::SeqCst);
        for (peripheral, name) in &self.advertised {
            self.emit(TransportEvent::PeripheralDiscovered {
                peripheral: peripheral.clone(),
                local_name: name.clone(),
                rssi: Some(-60),
            });
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scans_stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, peripheral: &FakePeripheral) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.complete_connections.load(Ordering::SeqCst) {
            self.emit(TransportEvent::PeripheralConnected {
                id: peripheral.id(),
            });
        }
        Ok(())
    }

    async fn cancel_connection(&self, peripheral: &FakePeripheral) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if self.fail_cancellation.load(Ordering::SeqCst) {
            return Err(Error::transport("cancel connection", "link busy"));
        }
        self.emit(TransportEvent::PeripheralDisconnected {
            id: peripheral.id(),
        });
        Ok(())
    }
}
