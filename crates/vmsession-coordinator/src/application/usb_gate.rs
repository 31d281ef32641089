//! Async operation gate for USB refresh / attach / detach.
//!
//! Each operation runs in three steps:
//!
//! 1. **Start** (inside the actor): check that a transport is attached, mark
//!    the USB state busy, spawn the transport call.  With no transport the
//!    call fails right here and nothing is marked busy.
//! 2. **Run** (spawned task): await the transport.  This can take as long as
//!    real I/O takes; the actor keeps serving other messages meanwhile.
//! 3. **Commit** (inside the actor): the task sends exactly one
//!    [`UsbCompletion`] back, which [`Session::commit_usb`] applies before
//!    clearing busy.
//!
//! The busy flag is advisory.  Overlapping operations are allowed and may
//! commit in any order; removal from the connected set is idempotent, so a
//! late refresh never resurrects a disconnected device there.
//!
//! [`Session::commit_usb`]: super::session::Session::commit_usb

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vmsession_core::{UsbDevice, UsbState};

use super::events::{Message, UsbCompletion};
use super::ports::UsbTransportHandle;

/// Why a USB operation could not be started.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsbGateError {
    #[error("no USB transport attached")]
    NoTransport,
    #[error("session coordinator has shut down")]
    CoordinatorGone,
}

/// A long-running USB operation.
#[derive(Debug, Clone)]
pub enum UsbOperation {
    Refresh,
    Connect(UsbDevice),
    Disconnect(UsbDevice),
}

impl fmt::Display for UsbOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbOperation::Refresh => f.write_str("refresh"),
            UsbOperation::Connect(d) => write!(f, "connect {d}"),
            UsbOperation::Disconnect(d) => write!(f, "disconnect {d}"),
        }
    }
}

/// Starts USB operations and routes their completions back to the actor.
pub(crate) struct UsbGate {
    transport: Option<UsbTransportHandle>,
    completions: mpsc::UnboundedSender<Message>,
}

impl UsbGate {
    pub(crate) fn new(completions: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            transport: None,
            completions,
        }
    }

    pub(crate) fn set_transport(&mut self, transport: Option<UsbTransportHandle>) {
        self.transport = transport;
    }

    pub(crate) fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Starts `op`: marks `usb` busy and spawns the transport call.
    ///
    /// # Errors
    ///
    /// Returns [`UsbGateError::NoTransport`] without touching `usb` when no
    /// transport is attached.
    pub(crate) fn start(
        &self,
        usb: &mut UsbState,
        op: UsbOperation,
    ) -> Result<JoinHandle<()>, UsbGateError> {
        let Some(UsbTransportHandle(transport)) = self.transport.clone() else {
            warn!("USB {op} requested with no transport attached");
            return Err(UsbGateError::NoTransport);
        };

        usb.begin_operation();
        debug!("USB {op} started");

        let completions = self.completions.clone();
        Ok(tokio::spawn(async move {
            let completion = match op {
                UsbOperation::Refresh => UsbCompletion::Refreshed(transport.enumerate().await),
                UsbOperation::Connect(device) => {
                    let result = transport.connect(device.clone()).await;
                    UsbCompletion::Connected { device, result }
                }
                UsbOperation::Disconnect(device) => {
                    let result = transport.disconnect(device.clone()).await;
                    UsbCompletion::Disconnected { device, result }
                }
            };
            if completions.send(Message::UsbCompleted(completion)).is_err() {
                debug!("coordinator gone; dropping USB completion");
            }
        }))
    }
}
