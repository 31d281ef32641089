//! Messages consumed by the coordinator actor.
//!
//! Everything that mutates session state arrives here as a [`Message`]:
//! engine callbacks (via the ingress adapter), observer commands (via
//! [`SessionHandle`](super::coordinator::SessionHandle)), and completions of
//! background USB operations and engine requests.

use tokio::sync::oneshot;
use vmsession_core::{Device, DeviceHandle, RunState, UsbDevice, WindowId};

use super::ports::{ConnectOutcome, TransportError, UsbTransportHandle};
use super::usb_gate::UsbGateError;

/// A normalised engine callback.
#[derive(Debug)]
pub enum EngineEvent {
    /// The VM reported a new run state.
    StateChanged(RunState),
    /// The VM reported a fatal error.  Does not change the run state by itself.
    FatalError(String),
    InputCreated(DeviceHandle),
    InputDestroyed(DeviceHandle),
    /// A display or serial terminal appeared.
    DeviceCreated(Device),
    /// A display or serial terminal went away.
    DeviceDestroyed(Device),
    /// An existing display changed its engine handle.
    DisplayUpdated(Device),
    /// The engine announced a device the ingress could not accept.
    DeviceRejected(String),
    /// The USB transport was attached (`Some`) or detached (`None`).
    UsbTransportChanged(Option<UsbTransportHandle>),
    UsbDeviceAttached(UsbDevice),
    UsbDeviceRemoved(UsbDevice),
    UsbDeviceError { device: UsbDevice, message: String },
}

/// Result of a background USB operation, committed exactly once.
#[derive(Debug)]
pub enum UsbCompletion {
    Refreshed(Result<Vec<UsbDevice>, TransportError>),
    Connected {
        device: UsbDevice,
        result: Result<ConnectOutcome, TransportError>,
    },
    Disconnected {
        device: UsbDevice,
        result: Result<(), TransportError>,
    },
}

/// Reply channel for a USB command: reports whether the operation started.
pub type GateReply = oneshot::Sender<Result<(), UsbGateError>>;

/// A request from an observer (window, panel, UI shell).
#[derive(Debug)]
pub enum Command {
    RegisterWindow(WindowId),
    RemoveWindow(WindowId),
    SetActiveWindow(WindowId),
    ClearError,
    UsbRefresh { reply: GateReply },
    UsbConnect { device: UsbDevice, reply: GateReply },
    UsbDisconnect { device: UsbDevice, reply: GateReply },
    PowerDown,
    PauseResume,
    Reset,
}

/// The actor's inbox.
#[derive(Debug)]
pub(crate) enum Message {
    Engine(EngineEvent),
    Command(Command),
    UsbCompleted(UsbCompletion),
    /// A fire-and-forget engine request failed.
    RequestFailed(String),
    /// Replies once every message sent before it has been committed.
    Sync(oneshot::Sender<()>),
    Shutdown,
}
