//! Observer bridge: exposes the session to a UI shell.
//!
//! A UI shell (desktop webview, remote panel, ...) talks to the coordinator
//! through the async functions in this module.  Each one takes a
//! [`SessionHandle`], performs one command, waits for it to commit, and
//! returns the resulting session state as plain serialisable DTOs.
//!
//! # Data Transfer Objects (DTOs)
//!
//! The coordinator uses internal types (`Device`, `WindowId`, `RunState`)
//! whose shape is not meant for a frontend.  The DTOs here:
//!
//! - contain only JSON-friendly fields (`String`, `u32`, `bool`, ...),
//! - derive `Serialize`/`Deserialize`,
//! - are a snapshot: holding one never blocks the coordinator.
//!
//! # `CommandResult<T>` wrapper
//!
//! Every function returns `CommandResult<T>` rather than `Result<T, E>` so
//! every response has the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.

use serde::{Deserialize, Serialize};
use vmsession_core::{Device, UsbDevice, WindowId};

use crate::application::coordinator::SessionHandle;
use crate::application::session::SessionSnapshot;

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// One live device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDto {
    /// `"display"`, `"serial"` or `"usb"`.
    pub kind: String,
    /// Monitor or port index; `None` for USB endpoints.
    pub index: Option<u32>,
    /// Engine handle rendered as text.
    pub handle: String,
    /// Human-readable label, e.g. `"display#0"`.
    pub label: String,
}

impl From<&Device> for DeviceDto {
    fn from(device: &Device) -> Self {
        let (index, handle) = match device {
            Device::Display {
                handle,
                monitor_index,
            } => (Some(*monitor_index), handle.to_string()),
            Device::Serial { handle, port_index } => (Some(*port_index), handle.to_string()),
            Device::Usb(handle) => (None, handle.to_string()),
        };
        Self {
            kind: device.kind().to_string(),
            index,
            handle,
            label: device.to_string(),
        }
    }
}

/// One window → device pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDto {
    pub window_id: String,
    pub device: DeviceDto,
}

/// One host USB device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceDto {
    pub handle: u64,
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl From<&UsbDevice> for UsbDeviceDto {
    fn from(device: &UsbDevice) -> Self {
        Self {
            handle: device.handle.0,
            name: device.name.clone(),
            vendor_id: device.vendor_id,
            product_id: device.product_id,
        }
    }
}

/// The whole published session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshotDto {
    pub state: String,
    pub fatal_error: Option<String>,
    pub last_error: Option<String>,
    pub primary_input: Option<String>,
    pub devices: Vec<DeviceDto>,
    pub windows: Vec<String>,
    pub primary_window: Option<String>,
    pub active_window: Option<String>,
    pub bindings: Vec<BindingDto>,
    pub usb_transport_attached: bool,
    pub usb_busy: bool,
    pub usb_all_devices: Vec<UsbDeviceDto>,
    pub usb_connected: Vec<UsbDeviceDto>,
    pub usb_most_recently_connected: Option<UsbDeviceDto>,
}

impl SessionSnapshotDto {
    /// Serialises the DTO as a JSON object.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialisation errors.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&SessionSnapshot> for SessionSnapshotDto {
    fn from(s: &SessionSnapshot) -> Self {
        Self {
            state: s.state.to_string(),
            fatal_error: s.fatal_error.clone(),
            last_error: s.last_error.clone(),
            primary_input: s.primary_input.map(|h| h.to_string()),
            devices: s.devices.iter().map(DeviceDto::from).collect(),
            windows: s.windows.iter().map(WindowId::to_string).collect(),
            primary_window: s.primary_window.map(|w| w.to_string()),
            active_window: s.active_window.map(|w| w.to_string()),
            bindings: s
                .bindings
                .iter()
                .map(|(window, device)| BindingDto {
                    window_id: window.to_string(),
                    device: DeviceDto::from(device),
                })
                .collect(),
            usb_transport_attached: s.usb_transport_attached,
            usb_busy: s.usb_busy,
            usb_all_devices: s.usb_all_devices.iter().map(UsbDeviceDto::from).collect(),
            usb_connected: s.usb_connected.iter().map(UsbDeviceDto::from).collect(),
            usb_most_recently_connected: s
                .usb_most_recently_connected
                .as_ref()
                .map(UsbDeviceDto::from),
        }
    }
}

/// Unified response wrapper used by every bridge function.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns the current session state.
pub async fn get_session(handle: &SessionHandle) -> CommandResult<SessionSnapshotDto> {
    CommandResult::ok(SessionSnapshotDto::from(&handle.snapshot()))
}

/// Registers a window by its UUID string.
///
/// # Example (frontend)
/// ```ts
/// const session = await invoke<SessionSnapshotDto>('register_window', { windowId });
/// ```
pub async fn register_window(
    handle: &SessionHandle,
    window_id: &str,
) -> CommandResult<SessionSnapshotDto> {
    run_window_command(handle, window_id, SessionHandle::register_window).await
}

/// Removes a window; its device stays registered and unassigned.
pub async fn remove_window(
    handle: &SessionHandle,
    window_id: &str,
) -> CommandResult<SessionSnapshotDto> {
    run_window_command(handle, window_id, SessionHandle::remove_window).await
}

pub async fn set_active_window(
    handle: &SessionHandle,
    window_id: &str,
) -> CommandResult<SessionSnapshotDto> {
    run_window_command(handle, window_id, SessionHandle::set_active_window).await
}

async fn run_window_command<E: std::fmt::Display>(
    handle: &SessionHandle,
    window_id: &str,
    command: impl FnOnce(&SessionHandle, WindowId) -> Result<(), E>,
) -> CommandResult<SessionSnapshotDto> {
    let id: WindowId = match window_id.parse() {
        Ok(id) => id,
        Err(e) => return CommandResult::err(format!("invalid window id: {e}")),
    };
    if let Err(e) = command(handle, id) {
        return CommandResult::err(e.to_string());
    }
    if let Err(e) = handle.sync().await {
        return CommandResult::err(e.to_string());
    }
    get_session(handle).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
