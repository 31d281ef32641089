//! The session coordinator actor and its observer handle.
//!
//! One tokio task owns the [`Session`] and is its only writer.  Engine
//! callbacks, observer commands and background completions all arrive on one
//! unbounded inbox and are applied strictly in arrival order.  After every
//! message the actor publishes a fresh [`SessionSnapshot`] on a `watch`
//! channel, so observers always see a state that satisfies the binding
//! invariant and never a half-applied update.
//!
//! ```text
//!  EventIngress ──┐
//!  SessionHandle ─┼──► inbox ──► Coordinator::run ──► watch<SessionSnapshot>
//!  USB / engine  ─┘                  │
//!  background tasks ◄────────────────┘ (spawned, report back via inbox)
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use vmsession_core::{MachineLayout, PauseResume, UsbDevice, WindowId};

use super::engine_requests::EngineRequests;
use super::events::{Command, EngineEvent, GateReply, Message};
use super::ports::{HostControl, VmEngine};
use super::session::{Session, SessionSnapshot};
use super::usb_gate::{UsbGate, UsbGateError, UsbOperation};

/// Error returned by [`SessionHandle`] when the coordinator task has exited.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("session coordinator has shut down")]
    Closed,
}

/// Serial terminal namespace used when none is configured.
pub const DEFAULT_TERMINAL_NAMESPACE: &str = "vmsession";

/// Delay between backgrounding and terminating the host when none is configured.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_millis(1000);

/// Static parameters of one coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub layout: MachineLayout,
    /// Whether this VM instance was restored from a saved-state snapshot.
    pub restored_from_snapshot: bool,
    /// Namespace prefix of serial terminal names reported by the engine.
    pub terminal_namespace: String,
    /// Delay between backgrounding the host and terminating it.
    pub terminate_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            layout: MachineLayout::default(),
            restored_from_snapshot: false,
            terminal_namespace: DEFAULT_TERMINAL_NAMESPACE.to_string(),
            terminate_grace: DEFAULT_TERMINATE_GRACE,
        }
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

/// The single writer of session state.
pub struct Coordinator {
    session: Session,
    gate: UsbGate,
    requests: EngineRequests,
    inbox: mpsc::UnboundedReceiver<Message>,
    published: watch::Sender<SessionSnapshot>,
}

impl Coordinator {
    /// Spawns the actor task and returns a handle to it.
    pub fn spawn(
        config: CoordinatorConfig,
        engine: Arc<dyn VmEngine>,
        host: Arc<dyn HostControl>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let session = Session::new(config.layout, config.restored_from_snapshot);
        let (published, snapshots) = watch::channel(session.snapshot(false));

        let coordinator = Self {
            session,
            gate: UsbGate::new(tx.clone()),
            requests: EngineRequests::new(engine, host, config.terminate_grace, tx.clone()),
            inbox,
            published,
        };
        let handle = SessionHandle {
            tx,
            snapshots,
            terminal_namespace: Arc::from(config.terminal_namespace.as_str()),
        };

        info!(
            monitors = config.layout.monitor_count,
            serial_ports = config.layout.serial_port_count,
            restored = config.restored_from_snapshot,
            "session coordinator starting"
        );
        (handle, tokio::spawn(coordinator.run()))
    }

    async fn run(mut self) {
        while let Some(message) = self.inbox.recv().await {
            match message {
                Message::Shutdown => break,
                // Everything received earlier is already committed and published.
                Message::Sync(reply) => {
                    let _ = reply.send(());
                }
                other => {
                    self.handle(other);
                    self.publish();
                }
            }
        }
        info!("session coordinator stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Engine(event) => self.handle_engine_event(event),
            Message::Command(command) => self.handle_command(command),
            Message::UsbCompleted(completion) => self.session.commit_usb(completion),
            Message::RequestFailed(message) => self.session.report_error(message),
            Message::Sync(_) | Message::Shutdown => {}
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StateChanged(state) => self.session.transition(state),
            EngineEvent::FatalError(message) => self.session.report_fatal(message),
            EngineEvent::InputCreated(handle) => self.session.input_created(handle),
            EngineEvent::InputDestroyed(handle) => self.session.input_destroyed(handle),
            EngineEvent::DeviceCreated(device) => {
                self.session.add_device(device);
            }
            EngineEvent::DeviceDestroyed(device) => {
                self.session.remove_device(&device);
            }
            EngineEvent::DisplayUpdated(device) => {
                self.session.update_display(device);
            }
            EngineEvent::DeviceRejected(reason) => self.session.report_error(reason),
            EngineEvent::UsbTransportChanged(transport) => {
                info!(attached = transport.is_some(), "USB transport changed");
                if transport.is_none() {
                    self.session.usb_mut().clear_snapshots();
                }
                self.gate.set_transport(transport);
            }
            EngineEvent::UsbDeviceAttached(device) => self.session.usb_device_attached(device),
            EngineEvent::UsbDeviceRemoved(device) => self.session.usb_device_removed(&device),
            EngineEvent::UsbDeviceError { device, message } => {
                self.session.report_error(format!("{device}: {message}"));
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RegisterWindow(id) => {
                self.session.register_window(id);
            }
            Command::RemoveWindow(id) => {
                self.session.remove_window(id);
            }
            Command::SetActiveWindow(id) => {
                self.session.set_active_window(id);
            }
            Command::ClearError => self.session.clear_error(),
            Command::UsbRefresh { reply } => self.start_usb(UsbOperation::Refresh, reply),
            Command::UsbConnect { device, reply } => {
                self.start_usb(UsbOperation::Connect(device), reply)
            }
            Command::UsbDisconnect { device, reply } => {
                self.start_usb(UsbOperation::Disconnect(device), reply)
            }
            Command::PowerDown => {
                info!("power down requested");
                self.requests.power_down();
            }
            Command::PauseResume => match self.session.lifecycle().pause_resume() {
                Some(PauseResume::Pause { save_state }) => {
                    info!(save_state, "pause requested");
                    self.requests.pause(save_state);
                }
                Some(PauseResume::Resume) => {
                    info!("resume requested");
                    self.requests.resume();
                }
                None => debug!(state = %self.session.state(), "pause/resume ignored"),
            },
            Command::Reset => {
                info!("reset requested");
                self.requests.reset();
            }
        }
    }

    fn start_usb(&mut self, op: UsbOperation, reply: GateReply) {
        let started = self.gate.start(self.session.usb_mut(), op).map(|_task| ());
        if reply.send(started).is_err() {
            debug!("USB command caller went away before the reply");
        }
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot(self.gate.has_transport());
        self.published.send_replace(snapshot);
    }
}

// ── Observer handle ───────────────────────────────────────────────────────────

/// Cloneable handle used by windows, panels and the engine ingress.
///
/// Commands are queued on the coordinator's inbox and applied in order with
/// engine events.  State is read through the published snapshot.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Message>,
    snapshots: watch::Receiver<SessionSnapshot>,
    terminal_namespace: Arc<str>,
}

impl SessionHandle {
    pub fn register_window(&self, id: WindowId) -> Result<(), CoordinatorError> {
        self.command(Command::RegisterWindow(id))
    }

    pub fn remove_window(&self, id: WindowId) -> Result<(), CoordinatorError> {
        self.command(Command::RemoveWindow(id))
    }

    pub fn set_active_window(&self, id: WindowId) -> Result<(), CoordinatorError> {
        self.command(Command::SetActiveWindow(id))
    }

    /// Dismisses the last non-fatal error.
    pub fn clear_error(&self) -> Result<(), CoordinatorError> {
        self.command(Command::ClearError)
    }

    /// Re-enumerates host USB devices.
    ///
    /// Resolves once the operation has *started*; the result is committed to
    /// the snapshot later.
    ///
    /// # Errors
    ///
    /// [`UsbGateError::NoTransport`] when no transport is attached.
    pub async fn usb_refresh(&self) -> Result<(), UsbGateError> {
        self.usb_command(|reply| Command::UsbRefresh { reply }).await
    }

    /// Attaches `device` to the VM.  See [`usb_refresh`](Self::usb_refresh).
    pub async fn usb_connect(&self, device: UsbDevice) -> Result<(), UsbGateError> {
        self.usb_command(|reply| Command::UsbConnect { device, reply })
            .await
    }

    /// Detaches `device` from the VM.  See [`usb_refresh`](Self::usb_refresh).
    pub async fn usb_disconnect(&self, device: UsbDevice) -> Result<(), UsbGateError> {
        self.usb_command(|reply| Command::UsbDisconnect { device, reply })
            .await
    }

    /// Deletes saved state, stops the VM and terminates the host.
    pub fn power_down(&self) -> Result<(), CoordinatorError> {
        self.command(Command::PowerDown)
    }

    /// Pauses a running VM or resumes a paused one.  Ignored in other states.
    pub fn pause_resume(&self) -> Result<(), CoordinatorError> {
        self.command(Command::PauseResume)
    }

    pub fn reset(&self) -> Result<(), CoordinatorError> {
        self.command(Command::Reset)
    }

    /// Waits until every message sent before this call has been committed.
    ///
    /// Background USB operations and engine requests still in flight are not
    /// waited for; use [`wait_for`](Self::wait_for) for those.
    pub async fn sync(&self) -> Result<(), CoordinatorError> {
        let (reply, done) = oneshot::channel();
        self.send(Message::Sync(reply))?;
        done.await.map_err(|_| CoordinatorError::Closed)
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified after every committed message.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Waits for the first published snapshot matching `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, CoordinatorError> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| CoordinatorError::Closed)?;
        Ok((*snapshot).clone())
    }

    /// Asks the coordinator to exit after the messages already queued.
    pub fn shutdown(&self) -> Result<(), CoordinatorError> {
        self.send(Message::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn send_engine_event(&self, event: EngineEvent) -> Result<(), CoordinatorError> {
        self.send(Message::Engine(event))
    }

    pub(crate) fn terminal_namespace(&self) -> &str {
        &self.terminal_namespace
    }

    fn command(&self, command: Command) -> Result<(), CoordinatorError> {
        self.send(Message::Command(command))
    }

    fn send(&self, message: Message) -> Result<(), CoordinatorError> {
        self.tx.send(message).map_err(|_| CoordinatorError::Closed)
    }

    async fn usb_command(
        &self,
        make: impl FnOnce(GateReply) -> Command,
    ) -> Result<(), UsbGateError> {
        let (reply, started) = oneshot::channel();
        self.command(make(reply))
            .map_err(|_| UsbGateError::CoordinatorGone)?;
        started.await.map_err(|_| UsbGateError::CoordinatorGone)?
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        EngineError, MockHostControl, MockUsbTransport, MockVmEngine, UsbTransportHandle,
    };
    use vmsession_core::{Device, DeviceHandle, RunState, UsbHandle};

    fn spawn_with(engine: MockVmEngine) -> (SessionHandle, JoinHandle<()>) {
        let config = CoordinatorConfig {
            layout: MachineLayout {
                monitor_count: 2,
                serial_port_count: 2,
            },
            terminate_grace: Duration::from_millis(1),
            ..CoordinatorConfig::default()
        };
        Coordinator::spawn(config, Arc::new(engine), Arc::new(MockHostControl::new()))
    }

    fn display(monitor_index: u32) -> Device {
        Device::Display {
            handle: DeviceHandle(10 + monitor_index as u64),
            monitor_index,
        }
    }

    fn usb(n: u64) -> UsbDevice {
        UsbDevice::new(UsbHandle(n), format!("usb-{n}"), 0x1050, 0x0407)
    }

    #[tokio::test]
    async fn test_engine_events_and_commands_are_applied_in_order() {
        // Arrange
        let (handle, _task) = spawn_with(MockVmEngine::new());
        let window = WindowId::new();

        // Act
        handle.register_window(window).expect("coordinator running");
        handle
            .send_engine_event(EngineEvent::DeviceCreated(display(0)))
            .expect("coordinator running");
        handle.sync().await.expect("coordinator running");

        // Assert
        let snap = handle.snapshot();
        assert_eq!(snap.device_for(window), Some(&display(0)));
        assert_eq!(snap.primary_window, Some(window));
    }

    #[tokio::test]
    async fn test_pause_resume_pauses_started_vm_with_save() {
        // Arrange
        let (called_tx, mut called_rx) = mpsc::unbounded_channel();
        let mut engine = MockVmEngine::new();
        engine
            .expect_pause()
            .times(1)
            .returning(move |save| {
                let _ = called_tx.send(save);
                Ok(())
            });
        let (handle, _task) = spawn_with(engine);
        handle
            .send_engine_event(EngineEvent::StateChanged(RunState::Started))
            .expect("coordinator running");

        // Act
        handle.pause_resume().expect("coordinator running");

        // Assert
        assert_eq!(called_rx.recv().await, Some(true));
    }

    #[tokio::test]
    async fn test_pause_resume_is_ignored_while_stopped() {
        // No expectations: any engine call would panic the request task.
        let (handle, _task) = spawn_with(MockVmEngine::new());

        handle.pause_resume().expect("coordinator running");
        handle.sync().await.expect("coordinator running");

        let snap = handle.snapshot();
        assert_eq!(snap.state, RunState::Stopped);
        assert_eq!(snap.last_error, None);
    }

    #[tokio::test]
    async fn test_failed_engine_request_surfaces_as_last_error() {
        let mut engine = MockVmEngine::new();
        engine
            .expect_reset()
            .returning(|| Err(EngineError::Rejected("not running".to_string())));
        let (handle, _task) = spawn_with(engine);

        handle.reset().expect("coordinator running");

        let snap = handle
            .wait_for(|s| s.last_error.is_some())
            .await
            .expect("coordinator running");
        assert_eq!(
            snap.last_error.as_deref(),
            Some("reset request failed: engine rejected request: not running")
        );

        handle.clear_error().expect("coordinator running");
        handle.sync().await.expect("coordinator running");
        assert_eq!(handle.snapshot().last_error, None);
    }

    #[tokio::test]
    async fn test_usb_command_without_transport_is_rejected() {
        let (handle, _task) = spawn_with(MockVmEngine::new());

        let result = handle.usb_connect(usb(1)).await;

        assert_eq!(result, Err(UsbGateError::NoTransport));
        assert!(!handle.snapshot().usb_busy);
    }

    #[tokio::test]
    async fn test_detaching_transport_clears_usb_snapshots() {
        // Arrange
        let mut transport = MockUsbTransport::new();
        transport
            .expect_enumerate()
            .returning(|| Ok(vec![usb(1), usb(2)]));
        let (handle, _task) = spawn_with(MockVmEngine::new());
        handle
            .send_engine_event(EngineEvent::UsbTransportChanged(Some(UsbTransportHandle::new(
                transport,
            ))))
            .expect("coordinator running");
        handle.usb_refresh().await.expect("transport attached");
        handle
            .wait_for(|s| !s.usb_busy && s.usb_all_devices.len() == 2)
            .await
            .expect("coordinator running");

        // Act
        handle
            .send_engine_event(EngineEvent::UsbTransportChanged(None))
            .expect("coordinator running");
        handle.sync().await.expect("coordinator running");

        // Assert
        let snap = handle.snapshot();
        assert!(!snap.usb_transport_attached);
        assert!(snap.usb_all_devices.is_empty());
        assert!(snap.usb_connected.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_actor_and_closes_handle() {
        let (handle, task) = spawn_with(MockVmEngine::new());

        handle.shutdown().expect("coordinator running");
        task.await.expect("actor must not panic");

        assert!(handle.is_closed());
        assert_eq!(handle.register_window(WindowId::new()), Err(CoordinatorError::Closed));
        assert_eq!(handle.sync().await, Err(CoordinatorError::Closed));
        assert_eq!(
            handle.usb_refresh().await,
            Err(UsbGateError::CoordinatorGone)
        );
    }
}
