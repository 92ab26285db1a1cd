//! A live connection to a SensorTag.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ble::transport::{GattPeripheral, Transport};
use crate::error::Result;
use crate::orchestrator::{OrchestratorState, StateTracker};
use crate::sensors::{BatterySensor, TemperatureSensor};
use crate::signal::CompletionSignal;

/// Sensor drivers built during service discovery.
pub(crate) struct SensorSet<P: GattPeripheral> {
    pub(crate) battery: Option<Arc<BatterySensor<P>>>,
    pub(crate) temperature: Option<Arc<TemperatureSensor<P>>>,
}

impl<P: GattPeripheral> SensorSet<P> {
    pub(crate) fn new() -> Self {
        Self {
            battery: None,
            temperature: None,
        }
    }

    pub(crate) fn cancel_notifications(&self) {
        if let Some(temperature) = &self.temperature {
            temperature.cancel_notifications();
        }
    }
}

impl<P: GattPeripheral> Clone for SensorSet<P> {
    fn clone(&self) -> Self {
        Self {
            battery: self.battery.clone(),
            temperature: self.temperature.clone(),
        }
    }
}

/// A connected, fully discovered SensorTag.
///
/// Only one connection per orchestrator can be live. Dropping the connection
/// releases that slot but does not disconnect the link; call
/// [`disconnect`](Self::disconnect) for an orderly shutdown.
pub struct Connection<T: Transport> {
    identifier: String,
    transport: Arc<T>,
    peripheral: Arc<T::Peripheral>,
    sensors: SensorSet<T::Peripheral>,
    /// Fires when the transport reports the link down.
    disconnected: CompletionSignal,
    /// Event task of the run that produced this connection.
    event_task: Mutex<Option<JoinHandle<()>>>,
    /// Single-connection slot shared with the orchestrator.
    active: Arc<Mutex<Option<String>>>,
    state: Arc<StateTracker>,
    closed: AtomicBool,
}

impl<T: Transport> Connection<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        identifier: String,
        transport: Arc<T>,
        peripheral: Arc<T::Peripheral>,
        sensors: SensorSet<T::Peripheral>,
        disconnected: CompletionSignal,
        event_task: Option<JoinHandle<()>>,
        active: Arc<Mutex<Option<String>>>,
        state: Arc<StateTracker>,
    ) -> Self {
        Self {
            identifier,
            transport,
            peripheral,
            sensors,
            disconnected,
            event_task: Mutex::new(event_task),
            active,
            state,
            closed: AtomicBool::new(false),
        }
    }

    /// Platform identifier of the peripheral.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The peripheral handle.
    pub fn peripheral(&self) -> &Arc<T::Peripheral> {
        &self.peripheral
    }

    /// Battery sensor, if the device exposes the Battery Service.
    pub fn battery(&self) -> Option<&BatterySensor<T::Peripheral>> {
        self.sensors.battery.as_deref()
    }

    /// IR temperature sensor, if the device exposes it.
    pub fn temperature(&self) -> Option<&TemperatureSensor<T::Peripheral>> {
        self.sensors.temperature.as_deref()
    }

    /// Check if the link is up and [`disconnect`](Self::disconnect) has not been called.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.disconnected.is_fired()
    }

    /// Wait until the link goes down, for any reason.
    pub async fn wait_disconnected(&self) {
        self.disconnected.wait().await;
    }

    /// Disconnect from the peripheral.
    ///
    /// Ends every notification stream, cancels the connection and waits for
    /// the transport to report it down. Calling this again is a no-op once a
    /// disconnect has succeeded. If the transport refuses to cancel, the
    /// connection stays open and keeps its slot.
    pub async fn disconnect(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Connection to {} already closed", self.identifier);
            return Ok(());
        }

        info!("Disconnecting from {}", self.identifier);
        self.state.set(OrchestratorState::Disconnecting);
        self.sensors.cancel_notifications();

        if !self.disconnected.is_fired() {
            if let Err(e) = self.transport.cancel_connection(&self.peripheral).await {
                warn!("Failed to cancel connection to {}: {}", self.identifier, e);
                self.closed.store(false, Ordering::SeqCst);
                self.state.set(OrchestratorState::Ready);
                return Err(e);
            }
            self.disconnected.wait().await;
        }

        self.release();
        self.state.set(OrchestratorState::Disconnected);
        info!("Disconnected from {}", self.identifier);
        Ok(())
    }

    /// Free the single-connection slot and stop the event task.
    fn release(&self) {
        let task = self.event_task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        self.active.lock().take();
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Connection to {} dropped without disconnect", self.identifier);
            self.sensors.cancel_notifications();
            self.release();
        }
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identifier", &self.identifier)
            .field("battery", &self.sensors.battery.is_some())
            .field("temperature", &self.sensors.temperature.is_some())
            .field("connected", &self.is_connected())
            .finish()
    }
}
