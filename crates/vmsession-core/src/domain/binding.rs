//! Device-to-window binder.
//!
//! Keeps a partial map from windows to devices using a greedy, deterministic
//! policy: a newly created device claims the first window (in registration
//! order) that is not already showing something.  It is not an optimal
//! matching and it never reshuffles existing pairs.
//!
//! ```text
//! windows:   [A]      [B]      [C]
//!             │        │
//! devices:  display#0 display#1   (display#2 arrives → C)
//! ```
//!
//! Freed windows stay free until the next device arrives.  A newly registered
//! window does not claim an already unassigned device; assignment only happens
//! as a side effect of a device arriving.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::device::{Device, DeviceRegistry};
use super::window::{WindowId, WindowRegistry};

/// The window → device binding map.
#[derive(Debug, Default, Clone)]
pub struct Binder {
    bindings: HashMap<WindowId, Device>,
}

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repair pass after a device was added.
    ///
    /// Binds `device` to the first free window and returns that window, or
    /// `None` when the device is not presentable, already shown somewhere,
    /// or every window is occupied.
    pub fn on_device_added(&mut self, windows: &WindowRegistry, device: &Device) -> Option<WindowId> {
        if !device.is_presentable() || self.window_for(device).is_some() {
            return None;
        }
        let free = windows.iter().find(|w| !self.bindings.contains_key(w))?;
        debug!(window = %free, %device, "bound device to window");
        self.bindings.insert(free, *device);
        Some(free)
    }

    /// Repair pass after a device was removed.
    ///
    /// Drops every binding showing `device` and returns the freed windows.
    /// Freed windows are not reassigned.
    pub fn on_device_removed(&mut self, device: &Device) -> Vec<WindowId> {
        let freed: Vec<WindowId> = self
            .bindings
            .iter()
            .filter(|(_, d)| *d == device)
            .map(|(w, _)| *w)
            .collect();
        for window in &freed {
            self.bindings.remove(window);
            debug!(%window, %device, "unbound device from window");
        }
        freed
    }

    /// Repair pass after a window was removed.  Returns the device it showed.
    pub fn on_window_removed(&mut self, window: WindowId) -> Option<Device> {
        self.bindings.remove(&window)
    }

    /// Refreshes the stored payload (engine handle) of a bound device.
    pub fn on_device_updated(&mut self, device: &Device) {
        for bound in self.bindings.values_mut().filter(|d| *d == device) {
            *bound = *device;
        }
    }

    /// Drops every binding.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn device_for(&self, window: WindowId) -> Option<&Device> {
        self.bindings.get(&window)
    }

    pub fn window_for(&self, device: &Device) -> Option<WindowId> {
        self.bindings
            .iter()
            .find(|(_, d)| *d == device)
            .map(|(w, _)| *w)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings listed in window registration order.
    pub fn bindings(&self, windows: &WindowRegistry) -> Vec<(WindowId, Device)> {
        windows
            .iter()
            .filter_map(|w| self.bindings.get(&w).map(|d| (w, *d)))
            .collect()
    }

    /// Returns `true` when every binding references a live window and a live
    /// device, and no device is shown in two windows.
    pub fn is_consistent(&self, windows: &WindowRegistry, devices: &DeviceRegistry) -> bool {
        let mut seen = HashSet::new();
        self.bindings.iter().all(|(w, d)| {
            windows.contains(*w) && devices.contains(d) && seen.insert(*d)
        })
    }
}
