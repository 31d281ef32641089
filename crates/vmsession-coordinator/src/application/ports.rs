//! Outbound ports: the engine, the host process, and the USB transport.
//!
//! The coordinator only ever talks to these traits.  Infrastructure provides
//! the implementations; unit tests use the `mockall` mocks generated here.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use vmsession_core::UsbDevice;

/// Error reported by the VM engine for a fire-and-forget request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine rejected request: {0}")]
    Rejected(String),
    #[error("engine is not attached")]
    Detached,
}

/// Error reported by the USB transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("USB enumeration failed: {0}")]
    Enumeration(String),
    #[error("USB transport I/O error: {0}")]
    Io(String),
}

/// Result of a USB attach attempt as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl ConnectOutcome {
    pub fn connected() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Requests the coordinator sends to the VM engine.
///
/// Each call may take arbitrarily long; the coordinator always issues them
/// from a spawned task, never from the actor loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VmEngine: Send + Sync {
    /// Deletes the saved-state snapshot of this VM instance.
    async fn delete_saved_state(&self) -> Result<(), EngineError>;

    /// Stops the VM.  Resolves when the stop has completed.
    async fn stop(&self) -> Result<(), EngineError>;

    /// Pauses the VM, optionally saving its state first.
    async fn pause(&self, save_state: bool) -> Result<(), EngineError>;

    /// Resumes a paused VM.
    async fn resume(&self) -> Result<(), EngineError>;

    /// Hard-resets the VM.
    async fn reset(&self) -> Result<(), EngineError>;
}

/// Control over the hosting application process.
#[cfg_attr(test, mockall::automock)]
pub trait HostControl: Send + Sync {
    /// First phase of termination: get the host out of the user's way.
    fn move_to_background(&self);

    /// Second phase of termination: exit the host.
    fn terminate(&self);
}

/// The host-side USB enumeration / passthrough service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsbTransport: Send + Sync {
    /// Lists the USB devices currently plugged into the host.
    async fn enumerate(&self) -> Result<Vec<UsbDevice>, TransportError>;

    /// Attaches `device` to the VM.
    async fn connect(&self, device: UsbDevice) -> Result<ConnectOutcome, TransportError>;

    /// Detaches `device` from the VM.
    async fn disconnect(&self, device: UsbDevice) -> Result<(), TransportError>;
}

/// Shared handle to an attached USB transport, as carried by engine events.
#[derive(Clone)]
pub struct UsbTransportHandle(pub Arc<dyn UsbTransport>);

impl UsbTransportHandle {
    pub fn new(transport: impl UsbTransport + 'static) -> Self {
        Self(Arc::new(transport))
    }
}

impl fmt::Debug for UsbTransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UsbTransportHandle(..)")
    }
}

impl From<Arc<dyn UsbTransport>> for UsbTransportHandle {
    fn from(transport: Arc<dyn UsbTransport>) -> Self {
        Self(transport)
    }
}
