//! Event ingress: the engine-facing callback surface.
//!
//! The VM engine calls these methods from its own threads, in any order and
//! possibly concurrently.  Every method does the minimum needed to turn the
//! raw callback into an [`EngineEvent`] and queues it on the coordinator
//! inbox.  Nothing here reads or writes session state, and nothing blocks:
//! the inbox is an unbounded channel whose `send` is synchronous, so these
//! methods are safe to call from threads that are not part of a tokio runtime.
//!
//! Serial terminal names are parsed here.  A name that does not follow the
//! `<namespace>.terminal.<index>` convention is logged and reported as a
//! non-fatal error; it is never forwarded as a device.

use tracing::{debug, warn};
use vmsession_core::{parse_terminal_port, Device, DeviceHandle, RunState, UsbDevice};

use crate::application::coordinator::SessionHandle;
use crate::application::events::EngineEvent;
use crate::application::ports::UsbTransportHandle;

/// Lifecycle and device callbacks raised by the VM engine.
pub trait EngineCallbacks: Send + Sync {
    fn state_changed(&self, state: RunState);
    fn fatal_error(&self, message: &str);
    fn input_created(&self, handle: DeviceHandle);
    fn input_destroyed(&self, handle: DeviceHandle);
    fn display_created(&self, handle: DeviceHandle, monitor_index: u32);
    fn display_destroyed(&self, handle: DeviceHandle, monitor_index: u32);
    fn display_updated(&self, handle: DeviceHandle, monitor_index: u32);
    fn serial_port_created(&self, handle: DeviceHandle, name: &str);
    fn serial_port_destroyed(&self, handle: DeviceHandle, name: &str);
    fn usb_transport_changed(&self, transport: Option<UsbTransportHandle>);
}

/// USB device callbacks raised by the VM engine.
pub trait UsbCallbacks: Send + Sync {
    fn usb_device_attached(&self, device: UsbDevice);
    fn usb_device_removed(&self, device: UsbDevice);
    fn usb_device_error(&self, device: UsbDevice, message: &str);
}

/// Forwards engine callbacks into the coordinator.
#[derive(Debug, Clone)]
pub struct EventIngress {
    handle: SessionHandle,
}

impl EventIngress {
    pub fn new(handle: SessionHandle) -> Self {
        Self { handle }
    }

    fn forward(&self, event: EngineEvent) {
        if let Err(e) = self.handle.send_engine_event(event) {
            debug!("engine callback dropped: {e}");
        }
    }

    fn serial(&self, handle: DeviceHandle, name: &str) -> Option<Device> {
        match parse_terminal_port(name, self.handle.terminal_namespace()) {
            Ok(port_index) => Some(Device::Serial { handle, port_index }),
            Err(e) => {
                warn!(%handle, "rejecting serial port: {e}");
                self.forward(EngineEvent::DeviceRejected(e.to_string()));
                None
            }
        }
    }
}

impl EngineCallbacks for EventIngress {
    fn state_changed(&self, state: RunState) {
        self.forward(EngineEvent::StateChanged(state));
    }

    fn fatal_error(&self, message: &str) {
        self.forward(EngineEvent::FatalError(message.to_string()));
    }

    fn input_created(&self, handle: DeviceHandle) {
        self.forward(EngineEvent::InputCreated(handle));
    }

    fn input_destroyed(&self, handle: DeviceHandle) {
        self.forward(EngineEvent::InputDestroyed(handle));
    }

    fn display_created(&self, handle: DeviceHandle, monitor_index: u32) {
        self.forward(EngineEvent::DeviceCreated(Device::Display {
            handle,
            monitor_index,
        }));
    }

    fn display_destroyed(&self, handle: DeviceHandle, monitor_index: u32) {
        self.forward(EngineEvent::DeviceDestroyed(Device::Display {
            handle,
            monitor_index,
        }));
    }

    fn display_updated(&self, handle: DeviceHandle, monitor_index: u32) {
        self.forward(EngineEvent::DisplayUpdated(Device::Display {
            handle,
            monitor_index,
        }));
    }

    fn serial_port_created(&self, handle: DeviceHandle, name: &str) {
        if let Some(device) = self.serial(handle, name) {
            self.forward(EngineEvent::DeviceCreated(device));
        }
    }

    fn serial_port_destroyed(&self, handle: DeviceHandle, name: &str) {
        if let Some(device) = self.serial(handle, name) {
            self.forward(EngineEvent::DeviceDestroyed(device));
        }
    }

    fn usb_transport_changed(&self, transport: Option<UsbTransportHandle>) {
        self.forward(EngineEvent::UsbTransportChanged(transport));
    }
}

impl UsbCallbacks for EventIngress {
    fn usb_device_attached(&self, device: UsbDevice) {
        self.forward(EngineEvent::UsbDeviceAttached(device));
    }

    fn usb_device_removed(&self, device: UsbDevice) {
        self.forward(EngineEvent::UsbDeviceRemoved(device));
    }

    fn usb_device_error(&self, device: UsbDevice, message: &str) {
        self.forward(EngineEvent::UsbDeviceError {
            device,
            message: message.to_string(),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
