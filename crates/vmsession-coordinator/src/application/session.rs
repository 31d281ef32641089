//! Session: the mutable state owned by the coordinator actor.
//!
//! A `Session` is created when a VM instance is attached and lives until the
//! coordinator shuts down.  It owns the device registry, the window registry,
//! the binder, the lifecycle tracker and the USB sub-state.  Every mutation
//! method keeps the binder in step with the registries, so after any call the
//! binding invariant holds:
//!
//! - no device is shown in two windows,
//! - no window shows two devices,
//! - every bound pair names a live window and a live device.
//!
//! `Session` is synchronous and has no notion of channels or tasks; the actor
//! in [`coordinator`](super::coordinator) is the only caller.

use tracing::{debug, error, info, warn};
use vmsession_core::{
    Binder, Device, DeviceHandle, DeviceRegistry, Lifecycle, MachineLayout, RunState, UsbDevice,
    UsbState, WindowId, WindowRegistry,
};

use super::events::UsbCompletion;

/// Read-only view of the session published to observers.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub state: RunState,
    pub fatal_error: Option<String>,
    /// Last non-fatal error (failed USB attach, failed engine request, ...).
    pub last_error: Option<String>,
    pub primary_input: Option<DeviceHandle>,
    pub devices: Vec<Device>,
    pub windows: Vec<WindowId>,
    pub primary_window: Option<WindowId>,
    pub active_window: Option<WindowId>,
    /// Window → device pairs in window registration order.
    pub bindings: Vec<(WindowId, Device)>,
    pub usb_transport_attached: bool,
    pub usb_busy: bool,
    pub usb_all_devices: Vec<UsbDevice>,
    pub usb_connected: Vec<UsbDevice>,
    pub usb_most_recently_connected: Option<UsbDevice>,
}

impl SessionSnapshot {
    /// The device shown in `window`, if any.
    pub fn device_for(&self, window: WindowId) -> Option<&Device> {
        self.bindings
            .iter()
            .find(|(w, _)| *w == window)
            .map(|(_, d)| d)
    }
}

/// Mutable session state.
#[derive(Debug)]
pub struct Session {
    layout: MachineLayout,
    lifecycle: Lifecycle,
    devices: DeviceRegistry,
    windows: WindowRegistry,
    binder: Binder,
    usb: UsbState,
    fatal_error: Option<String>,
    last_error: Option<String>,
    primary_input: Option<DeviceHandle>,
}

impl Session {
    pub fn new(layout: MachineLayout, restored_from_snapshot: bool) -> Self {
        Self {
            layout,
            lifecycle: Lifecycle::new(restored_from_snapshot),
            devices: DeviceRegistry::new(),
            windows: WindowRegistry::new(),
            binder: Binder::new(),
            usb: UsbState::new(),
            fatal_error: None,
            last_error: None,
            primary_input: None,
        }
    }

    // ── Devices ───────────────────────────────────────────────────────────────

    /// Registers a device and lets it claim the first free window.
    ///
    /// Devices whose index falls outside the machine layout are an engine bug;
    /// they are logged and dropped without touching any state.
    pub fn add_device(&mut self, device: Device) -> bool {
        if let Err(e) = self.layout.validate(&device) {
            error!(%device, "rejecting device: {e}");
            return false;
        }
        self.devices.add(device);
        match self.binder.on_device_added(&self.windows, &device) {
            Some(window) => info!(%device, %window, "device created"),
            None => info!(%device, "device created (unassigned)"),
        }
        true
    }

    /// Removes a device and drops any binding showing it.
    pub fn remove_device(&mut self, device: &Device) -> bool {
        let removed = self.devices.remove(device);
        self.binder.on_device_removed(device);
        if removed {
            info!(%device, "device destroyed");
        } else {
            debug!(%device, "destroy for unknown device ignored");
        }
        removed
    }

    /// Applies a "display updated" event to a registered display.
    pub fn update_display(&mut self, device: Device) -> bool {
        if self.devices.update_handle(device) {
            self.binder.on_device_updated(&device);
            debug!(%device, "display updated");
            true
        } else {
            debug!(%device, "update for unknown display ignored");
            false
        }
    }

    pub fn input_created(&mut self, handle: DeviceHandle) {
        if self.primary_input.is_none() {
            info!(%handle, "primary input attached");
            self.primary_input = Some(handle);
        }
    }

    pub fn input_destroyed(&mut self, handle: DeviceHandle) {
        if self.primary_input == Some(handle) {
            info!(%handle, "primary input detached");
            self.primary_input = None;
        }
    }

    // ── Windows ───────────────────────────────────────────────────────────────

    /// Registers a window.  A new window does not claim an unassigned device.
    pub fn register_window(&mut self, id: WindowId) -> bool {
        let added = self.windows.register(id);
        if added {
            info!(window = %id, "window registered");
        } else {
            debug!(window = %id, "duplicate window registration ignored");
        }
        added
    }

    /// Removes a window together with its binding.
    pub fn remove_window(&mut self, id: WindowId) -> bool {
        let removed = self.windows.remove(id);
        let unbound = self.binder.on_window_removed(id);
        if removed {
            info!(window = %id, device = ?unbound, "window removed");
        } else {
            debug!(window = %id, "removal of unknown window ignored");
        }
        removed
    }

    pub fn set_active_window(&mut self, id: WindowId) -> bool {
        let changed = self.windows.set_active(id);
        if !changed {
            debug!(window = %id, "activation of unknown window ignored");
        }
        changed
    }

    // ── Lifecycle and errors ──────────────────────────────────────────────────

    /// Commits an engine-reported run state and applies its side effects.
    pub fn transition(&mut self, next: RunState) {
        let previous = self.lifecycle.state();
        let effect = self.lifecycle.transition(next);
        info!(%previous, %next, "run state changed");

        if effect.clears_fatal_error {
            self.fatal_error = None;
        }
        if effect.clears_devices {
            debug!(
                devices = self.devices.len(),
                bindings = self.binder.len(),
                "VM stopped; clearing devices"
            );
            self.devices.clear();
            self.binder.clear();
            self.usb.clear_snapshots();
            self.primary_input = None;
        }
    }

    pub fn report_fatal(&mut self, message: String) {
        error!("VM fatal error: {message}");
        self.fatal_error = Some(message);
    }

    pub fn report_error(&mut self, message: String) {
        warn!("{message}");
        self.last_error = Some(message);
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    // ── USB ───────────────────────────────────────────────────────────────────

    pub fn usb(&self) -> &UsbState {
        &self.usb
    }

    pub fn usb_mut(&mut self) -> &mut UsbState {
        &mut self.usb
    }

    /// The engine attached a USB device on its own (e.g. auto-capture).
    pub fn usb_device_attached(&mut self, device: UsbDevice) {
        info!(%device, "USB device attached");
        self.track_usb_connected(device);
    }

    /// The engine reports a USB device is gone from the VM.
    pub fn usb_device_removed(&mut self, device: &UsbDevice) {
        info!(%device, "USB device removed");
        self.track_usb_disconnected(device);
    }

    /// Keeps the device registry and the connected set in step.
    fn track_usb_connected(&mut self, device: UsbDevice) {
        let endpoint = Device::Usb(device.handle);
        if !self.devices.contains(&endpoint) {
            self.add_device(endpoint);
        }
        self.usb.mark_connected(device);
    }

    fn track_usb_disconnected(&mut self, device: &UsbDevice) {
        self.remove_device(&Device::Usb(device.handle));
        self.usb.mark_disconnected(device);
    }

    /// Commits the result of a background USB operation and releases the gate.
    ///
    /// A refresh that was started before the VM stopped still commits its
    /// enumeration here; the list converges on the next refresh.
    pub fn commit_usb(&mut self, completion: UsbCompletion) {
        match completion {
            UsbCompletion::Refreshed(Ok(devices)) => {
                debug!(count = devices.len(), "USB enumeration committed");
                self.usb.replace_all(devices);
            }
            UsbCompletion::Refreshed(Err(e)) => {
                warn!("USB refresh aborted: {e}");
            }
            UsbCompletion::Connected { device, result } => match result {
                Ok(outcome) if outcome.success => {
                    info!(%device, "USB device connected");
                    self.track_usb_connected(device);
                }
                Ok(outcome) => {
                    let message = outcome
                        .message
                        .unwrap_or_else(|| format!("failed to connect {device}"));
                    self.report_error(message);
                }
                Err(e) => self.report_error(format!("failed to connect {device}: {e}")),
            },
            UsbCompletion::Disconnected { device, result } => {
                if let Err(e) = result {
                    warn!(%device, "USB disconnect reported an error: {e}");
                }
                info!(%device, "USB device disconnected");
                self.track_usb_disconnected(&device);
            }
        }
        self.usb.finish_operation();
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn windows(&self) -> &WindowRegistry {
        &self.windows
    }

    pub fn binder(&self) -> &Binder {
        &self.binder
    }

    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal_error.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Builds the observer snapshot.
    pub fn snapshot(&self, usb_transport_attached: bool) -> SessionSnapshot {
        SessionSnapshot {
            state: self.lifecycle.state(),
            fatal_error: self.fatal_error.clone(),
            last_error: self.last_error.clone(),
            primary_input: self.primary_input,
            devices: self.devices.to_vec(),
            windows: self.windows.to_vec(),
            primary_window: self.windows.primary(),
            active_window: self.windows.active(),
            bindings: self.binder.bindings(&self.windows),
            usb_transport_attached,
            usb_busy: self.usb.busy(),
            usb_all_devices: self.usb.all_devices().to_vec(),
            usb_connected: self.usb.connected().to_vec(),
            usb_most_recently_connected: self.usb.most_recently_connected().cloned(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
