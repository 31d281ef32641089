//! Device domain entity and the authoritative device registry.
//!
//! A [`Device`] is a value, not a pointer: two devices are the same device when
//! their kind and index (or USB handle) match.  The engine handle carried by
//! displays and serial ports is payload only and never takes part in equality.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque handle the VM engine assigns to a device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

/// Opaque handle identifying a USB device on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsbHandle(pub u64);

impl fmt::Display for UsbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "usb:{:x}", self.0)
    }
}

/// Errors raised while normalising or validating device events.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// A serial port name does not follow `"<namespace>.terminal.<index>"`.
    #[error("serial port name {name:?} does not match \"{namespace}.terminal.<index>\"")]
    BadTerminalName { name: String, namespace: String },

    /// A display references a monitor the VM configuration does not have.
    #[error("monitor index {index} out of range (configured monitors: {configured})")]
    MonitorOutOfRange { index: u32, configured: u32 },

    /// A serial port references a terminal the VM configuration does not have.
    #[error("serial port index {index} out of range (configured ports: {configured})")]
    PortOutOfRange { index: u32, configured: u32 },
}

/// A live I/O device exposed by the running VM instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Device {
    /// A graphical display bound to monitor `monitor_index` of the VM configuration.
    Display {
        handle: DeviceHandle,
        monitor_index: u32,
    },
    /// A serial terminal bound to port `port_index` of the VM configuration.
    Serial {
        handle: DeviceHandle,
        port_index: u32,
    },
    /// A USB endpoint passed through to the guest.
    Usb(UsbHandle),
}

impl Device {
    /// Short kind label used in logs and DTOs.
    pub fn kind(&self) -> &'static str {
        match self {
            Device::Display { .. } => "display",
            Device::Serial { .. } => "serial",
            Device::Usb(_) => "usb",
        }
    }

    /// Returns `true` for devices that can be shown in a window.
    ///
    /// USB endpoints have no visual surface and are never bound.
    pub fn is_presentable(&self) -> bool {
        !matches!(self, Device::Usb(_))
    }

    /// Engine handle for displays and serial ports.
    pub fn handle(&self) -> Option<DeviceHandle> {
        match self {
            Device::Display { handle, .. } | Device::Serial { handle, .. } => Some(*handle),
            Device::Usb(_) => None,
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Device::Display { monitor_index: a, .. },
                Device::Display { monitor_index: b, .. },
            ) => a == b,
            (Device::Serial { port_index: a, .. }, Device::Serial { port_index: b, .. }) => a == b,
            (Device::Usb(a), Device::Usb(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Device::Display { monitor_index, .. } => monitor_index.hash(state),
            Device::Serial { port_index, .. } => port_index.hash(state),
            Device::Usb(handle) => handle.hash(state),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Display { monitor_index, .. } => write!(f, "display#{monitor_index}"),
            Device::Serial { port_index, .. } => write!(f, "serial#{port_index}"),
            Device::Usb(handle) => write!(f, "{handle}"),
        }
    }
}

// ── Static machine configuration ──────────────────────────────────────────────

/// The device counts fixed by the VM configuration.
///
/// Display and serial indices reported by the engine must be below these
/// counts; anything else is an engine bug and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineLayout {
    pub monitor_count: u32,
    pub serial_port_count: u32,
}

impl Default for MachineLayout {
    fn default() -> Self {
        Self {
            monitor_count: 1,
            serial_port_count: 1,
        }
    }
}

impl MachineLayout {
    /// Checks that the device's back-reference index is within the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::MonitorOutOfRange`] or [`DeviceError::PortOutOfRange`].
    pub fn validate(&self, device: &Device) -> Result<(), DeviceError> {
        match *device {
            Device::Display { monitor_index, .. } if monitor_index >= self.monitor_count => {
                Err(DeviceError::MonitorOutOfRange {
                    index: monitor_index,
                    configured: self.monitor_count,
                })
            }
            Device::Serial { port_index, .. } if port_index >= self.serial_port_count => {
                Err(DeviceError::PortOutOfRange {
                    index: port_index,
                    configured: self.serial_port_count,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Parses a serial port name of the form `"<namespace>.terminal.<index>"`.
///
/// # Errors
///
/// Returns [`DeviceError::BadTerminalName`] when the prefix does not match or
/// the suffix is not a decimal index.
///
/// # Example
///
/// ```rust
/// use vmsession_core::parse_terminal_port;
///
/// assert_eq!(parse_terminal_port("ns.terminal.3", "ns"), Ok(3));
/// assert!(parse_terminal_port("other.port", "ns").is_err());
/// ```
pub fn parse_terminal_port(name: &str, namespace: &str) -> Result<u32, DeviceError> {
    let bad = || DeviceError::BadTerminalName {
        name: name.to_string(),
        namespace: namespace.to_string(),
    };

    let index = name
        .strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix(".terminal."))
        .ok_or_else(bad)?;

    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    index.parse::<u32>().map_err(|_| bad())
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Authoritative list of currently live devices.
///
/// Insertion is append-only: the engine event stream is the sole producer, so
/// duplicates are not filtered on add.  Removal drops every structurally equal
/// entry, which makes destroy events idempotent.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a device.
    pub fn add(&mut self, device: Device) {
        self.devices.push(device);
    }

    /// Removes every entry equal to `device`.  Returns `true` if anything was removed.
    pub fn remove(&mut self, device: &Device) -> bool {
        let before = self.devices.len();
        self.devices.retain(|d| d != device);
        self.devices.len() != before
    }

    /// Replaces the engine handle of the matching entry.
    ///
    /// Returns `false` (and changes nothing) when the device is not registered.
    pub fn update_handle(&mut self, device: Device) -> bool {
        match self.devices.iter_mut().find(|d| **d == device) {
            Some(slot) => {
                *slot = device;
                true
            }
            None => false,
        }
    }

    /// Empties the registry.
    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn contains(&self, device: &Device) -> bool {
        self.devices.contains(device)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Snapshot of all devices in insertion order.
    pub fn to_vec(&self) -> Vec<Device> {
        self.devices.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
