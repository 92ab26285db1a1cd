//! Connection orchestration.
//!
//! [`ConnectionOrchestrator`] drives a SensorTag from a cold radio to a ready
//! [`Connection`]: power on, scan, match on the advertised name, connect and
//! discover every service. Each attempt races against a deadline, and a
//! failed attempt exposes nothing.

use futures::stream::{BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ble::transport::{GattPeripheral, PowerState, Transport, TransportEvent};
use crate::config::OrchestratorConfig;
use crate::connection::{Connection, SensorSet};
use crate::error::{Error, Result};
use crate::registry::ServiceRegistry;
use crate::sensors::Sensor;
use crate::signal::CompletionSignal;

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrchestratorState {
    /// No attempt in progress.
    #[default]
    Idle,
    /// Waiting for the radio.
    PoweringOn,
    /// Scanning for the target name.
    Scanning,
    /// Target found, connection requested.
    Connecting,
    /// Link up, building sensor drivers.
    DiscoveringServices,
    /// A connection is ready for use.
    Ready,
    /// Disconnect in progress.
    Disconnecting,
    /// The last connection went down.
    Disconnected,
    /// The radio never came up or the target was never seen.
    DiscoveryTimedOut,
    /// The target was found but never became ready.
    ConnectTimedOut,
    /// The last attempt failed with an error.
    Failed,
}

impl OrchestratorState {
    /// Check if an attempt is in progress.
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Self::PoweringOn | Self::Scanning | Self::Connecting | Self::DiscoveringServices
        )
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::PoweringOn => write!(f, "Powering On"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::DiscoveringServices => write!(f, "Discovering Services"),
            Self::Ready => write!(f, "Ready"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::DiscoveryTimedOut => write!(f, "Discovery Timed Out"),
            Self::ConnectTimedOut => write!(f, "Connect Timed Out"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Event for orchestrator state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// The previous state.
    pub from: OrchestratorState,
    /// The new state.
    pub to: OrchestratorState,
}

/// Current state plus a broadcast of every transition.
pub(crate) struct StateTracker {
    state: RwLock<OrchestratorState>,
    event_tx: broadcast::Sender<StateChange>,
}

impl StateTracker {
    fn new() -> Self {
        let (event_tx, _) = broadcast::channel(32);
        Self {
            state: RwLock::new(OrchestratorState::Idle),
            event_tx,
        }
    }

    pub(crate) fn get(&self) -> OrchestratorState {
        *self.state.read()
    }

    /// Update the state and emit an event.
    pub(crate) fn set(&self, new_state: OrchestratorState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("Orchestrator state changed: {} -> {}", old_state, new_state);
            let _ = self.event_tx.send(StateChange {
                from: old_state,
                to: new_state,
            });
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.event_tx.subscribe()
    }
}

/// Result of a run, posted once by the event task.
type Outcome<P> = Result<(Arc<P>, SensorSet<P>)>;

/// Per-attempt state shared between `connect` and its event task.
struct RunContext<T: Transport> {
    transport: Arc<T>,
    target: String,
    strict_services: bool,
    state: Arc<StateTracker>,
    /// The matched peripheral, once a connect has been requested.
    pending: Arc<Mutex<Option<Arc<T::Peripheral>>>>,
    disconnected: CompletionSignal,
}

impl<T: Transport> RunContext<T> {
    /// Process transport events for the lifetime of the attempt and, on
    /// success, of the connection.
    async fn run(
        self,
        mut events: BoxStream<'static, TransportEvent<T::Peripheral>>,
        ready_tx: oneshot::Sender<Outcome<T::Peripheral>>,
    ) {
        let mut ready_tx = Some(ready_tx);
        let mut matched: Option<Arc<T::Peripheral>> = None;
        let mut sensors: Option<SensorSet<T::Peripheral>> = None;

        while let Some(event) = events.next().await {
            match event {
                TransportEvent::StateChanged(PowerState::PoweredOn) => {
                    if matched.is_none() {
                        debug!("Radio powered on, resuming scan");
                        if let Err(e) = self.transport.start_scan().await {
                            warn!("Failed to resume scan: {}", e);
                        }
                    }
                }
                TransportEvent::StateChanged(state) => {
                    warn!("Radio state changed to {}, stopping scan", state);
                    if let Err(e) = self.transport.stop_scan().await {
                        debug!("Failed to stop scan: {}", e);
                    }
                }
                TransportEvent::PeripheralDiscovered {
                    peripheral,
                    local_name,
                    rssi,
                } => {
                    if matched.is_some() || local_name.as_deref() != Some(self.target.as_str()) {
                        continue;
                    }

                    info!(
                        "Found {} ({}) RSSI {:?}",
                        self.target,
                        peripheral.id(),
                        rssi
                    );

                    if let Err(e) = self.transport.stop_scan().await {
                        warn!("Failed to stop scan: {}", e);
                    }

                    self.state.set(OrchestratorState::Connecting);
                    *self.pending.lock() = Some(peripheral.clone());
                    matched = Some(peripheral.clone());

                    if let Err(e) = self.transport.connect(&peripheral).await {
                        Self::post(&mut ready_tx, Err(e));
                    }
                }
                TransportEvent::PeripheralConnected { id } => {
                    let Some(peripheral) = matched.clone() else {
                        continue;
                    };
                    if id != peripheral.id() || ready_tx.is_none() {
                        continue;
                    }

                    info!("Connected to {}", id);
                    self.state.set(OrchestratorState::DiscoveringServices);

                    let outcome = discover_sensors(&peripheral, self.strict_services).await;
                    if let Ok(found) = &outcome {
                        sensors = Some(found.clone());
                    }
                    Self::post(&mut ready_tx, outcome.map(|found| (peripheral, found)));
                }
                TransportEvent::PeripheralDisconnected { id } => {
                    let is_target = matched.as_ref().map_or(false, |p| p.id() == id);
                    if !is_target {
                        continue;
                    }

                    if ready_tx.is_some() {
                        warn!("{} disconnected before it was ready", id);
                        Self::post(&mut ready_tx, Err(Error::ConnectionLost));
                    } else {
                        info!("{} disconnected", id);
                        self.state.set(OrchestratorState::Disconnected);
                    }
                    break;
                }
            }
        }

        if ready_tx.is_some() {
            Self::post(&mut ready_tx, Err(Error::ConnectionLost));
        }

        if let Some(sensors) = sensors {
            sensors.cancel_notifications();
        }
        self.disconnected.fire();
    }

    /// Post the outcome. Only the first post has an effect.
    fn post(
        ready_tx: &mut Option<oneshot::Sender<Outcome<T::Peripheral>>>,
        outcome: Outcome<T::Peripheral>,
    ) {
        if let Some(tx) = ready_tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Owns an in-flight attempt until it becomes a [`Connection`].
///
/// Dropping an armed guard (for example when the `connect` future is
/// dropped) aborts the event task and cancels the pending link in the
/// background.
struct AttemptGuard<T: Transport> {
    transport: Arc<T>,
    state: Arc<StateTracker>,
    event_task: Option<JoinHandle<()>>,
    pending: Arc<Mutex<Option<Arc<T::Peripheral>>>>,
}

impl<T: Transport> AttemptGuard<T> {
    /// Disarm and hand over the event task.
    fn into_task(mut self) -> Option<JoinHandle<()>> {
        self.pending.lock().take();
        self.event_task.take()
    }

    /// Tear down a failed attempt. Cleanup is best-effort.
    async fn abandon(mut self, state: OrchestratorState) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }

        if let Err(e) = self.transport.stop_scan().await {
            debug!("Failed to stop scan: {}", e);
        }

        let peripheral = self.pending.lock().take();
        if let Some(peripheral) = peripheral {
            if let Err(e) = self.transport.cancel_connection(&peripheral).await {
                debug!("Failed to cancel pending connection: {}", e);
            }
        }

        self.state.set(state);
    }
}

impl<T: Transport> Drop for AttemptGuard<T> {
    fn drop(&mut self) {
        let Some(task) = self.event_task.take() else {
            return;
        };

        warn!("Connect attempt dropped before completion");
        task.abort();
        self.state.set(OrchestratorState::Failed);

        let transport = self.transport.clone();
        let peripheral = self.pending.lock().take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = transport.stop_scan().await {
                        debug!("Failed to stop scan: {}", e);
                    }
                    if let Some(peripheral) = peripheral {
                        if let Err(e) = transport.cancel_connection(&peripheral).await {
                            debug!("Failed to cancel pending connection: {}", e);
                        }
                    }
                });
            }
            Err(_) => debug!("No runtime available to cancel the pending connection"),
        }
    }
}

/// Build a driver for every recognized service of a connected peripheral.
async fn discover_sensors<P: GattPeripheral>(
    peripheral: &Arc<P>,
    strict_services: bool,
) -> Result<SensorSet<P>> {
    let services = peripheral.discover_services().await?;
    let mut sensors = SensorSet::new();

    for service in &services {
        if !ServiceRegistry::is_recognized(&service.uuid) {
            if strict_services {
                return Err(Error::UnknownService {
                    uuid: service.uuid.to_string(),
                });
            }
            debug!("Skipping unrecognized service {}", service.uuid);
            continue;
        }

        match ServiceRegistry::build_driver(peripheral, service).await? {
            Sensor::Battery(battery) => sensors.battery = Some(Arc::new(battery)),
            Sensor::Temperature(temperature) => {
                sensors.temperature = Some(Arc::new(temperature))
            }
        }
    }

    Ok(sensors)
}

/// Finds, connects to and discovers a SensorTag.
pub struct ConnectionOrchestrator<T: Transport> {
    transport: Arc<T>,
    config: OrchestratorConfig,
    state: Arc<StateTracker>,
    /// Set once the radio has powered on.
    powered: AtomicBool,
    /// Identifier of the live connection, if any.
    active: Arc<Mutex<Option<String>>>,
    /// Serializes connect attempts.
    connect_lock: tokio::sync::Mutex<()>,
}

impl<T: Transport> ConnectionOrchestrator<T> {
    /// Create an orchestrator that exclusively owns `transport`.
    pub fn new(transport: T, config: OrchestratorConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            state: Arc::new(StateTracker::new()),
            powered: AtomicBool::new(false),
            active: Arc::new(Mutex::new(None)),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> OrchestratorState {
        self.state.get()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> broadcast::Receiver<StateChange> {
        self.state.subscribe()
    }

    /// Connect to the configured target within the configured deadline.
    pub async fn connect_default(&self) -> Result<Connection<T>> {
        let target = self.config.target_name.clone();
        self.connect(&target, self.config.connect_timeout).await
    }

    /// Connect to the peripheral advertising exactly `target_name`.
    ///
    /// `timeout` bounds everything from scan start until every service has a
    /// driver. Powering on the radio has its own deadline
    /// ([`OrchestratorConfig::power_on_timeout`]).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] while a previous connection is live
    /// - [`Error::PowerOnTimeout`], [`Error::ScanTimeout`] or
    ///   [`Error::ConnectTimeout`] when a deadline passes
    /// - [`Error::UnknownService`] in strict mode, and any discovery or
    ///   transport error unmodified
    pub async fn connect(&self, target_name: &str, timeout: Duration) -> Result<Connection<T>> {
        let _guard = self.connect_lock.lock().await;

        let existing = self.active.lock().clone();
        if let Some(identifier) = existing {
            return Err(Error::AlreadyConnected { identifier });
        }

        self.power_on().await?;

        let events = match self.transport.events().await {
            Ok(events) => events,
            Err(e) => {
                self.state.set(OrchestratorState::Failed);
                return Err(e);
            }
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let pending: Arc<Mutex<Option<Arc<T::Peripheral>>>> = Arc::new(Mutex::new(None));
        let disconnected = CompletionSignal::new();
        let context = RunContext {
            transport: self.transport.clone(),
            target: target_name.to_string(),
            strict_services: self.config.strict_services,
            state: self.state.clone(),
            pending: pending.clone(),
            disconnected: disconnected.clone(),
        };
        let attempt = AttemptGuard {
            transport: self.transport.clone(),
            state: self.state.clone(),
            event_task: Some(tokio::spawn(context.run(events, ready_tx))),
            pending,
        };

        info!("Scanning for {}", target_name);
        self.state.set(OrchestratorState::Scanning);
        if let Err(e) = self.transport.start_scan().await {
            attempt.abandon(OrchestratorState::Failed).await;
            return Err(e);
        }

        let (peripheral, sensors) = match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(Ok(ready))) => ready,
            Ok(Ok(Err(e))) => {
                warn!("Connecting to {} failed: {}", target_name, e);
                attempt.abandon(OrchestratorState::Failed).await;
                return Err(e);
            }
            Ok(Err(_)) => {
                attempt.abandon(OrchestratorState::Failed).await;
                return Err(Error::ConnectionLost);
            }
            Err(_) => {
                let scanning = matches!(
                    self.state.get(),
                    OrchestratorState::PoweringOn | OrchestratorState::Scanning
                );
                let target = target_name.to_string();
                let (state, error) = if scanning {
                    (
                        OrchestratorState::DiscoveryTimedOut,
                        Error::ScanTimeout { target, timeout },
                    )
                } else {
                    (
                        OrchestratorState::ConnectTimedOut,
                        Error::ConnectTimeout { target, timeout },
                    )
                };
                warn!("{}", error);
                attempt.abandon(state).await;
                return Err(error);
            }
        };

        let event_task = attempt.into_task();
        let identifier = peripheral.id();
        *self.active.lock() = Some(identifier.clone());
        self.state.set(OrchestratorState::Ready);
        info!("{} ready", identifier);

        Ok(Connection::new(
            identifier,
            self.transport.clone(),
            peripheral,
            sensors,
            disconnected,
            event_task,
            self.active.clone(),
            self.state.clone(),
        ))
    }

    /// Disconnect `connection`. A no-op if it is already closed.
    pub async fn disconnect(&self, connection: &Connection<T>) -> Result<()> {
        connection.disconnect().await
    }

    /// Power on the radio once, bounded by the power-on deadline.
    async fn power_on(&self) -> Result<()> {
        if self.powered.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.state.set(OrchestratorState::PoweringOn);

        let (tx, rx) = oneshot::channel();
        let transport = self.transport.clone();
        let task = tokio::spawn(async move {
            let _ = tx.send(transport.power_on().await);
        });

        let deadline = self.config.power_on_timeout;
        let result = tokio::select! {
            result = rx => match result {
                Ok(result) => result,
                Err(_) => Err(Error::transport("power on", "power-on task ended without a result")),
            },
            _ = tokio::time::sleep(deadline) => {
                task.abort();
                self.state.set(OrchestratorState::DiscoveryTimedOut);
                warn!("Bluetooth radio did not power on within {:?}", deadline);
                return Err(Error::PowerOnTimeout { timeout: deadline });
            }
        };

        match result {
            Ok(()) => {
                info!("Bluetooth radio powered on");
                self.powered.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to power on Bluetooth radio: {}", e);
                self.state.set(OrchestratorState::Failed);
                Err(e)
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for ConnectionOrchestrator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOrchestrator")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}
