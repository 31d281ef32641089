//! USB passthrough sub-state of a session.
//!
//! `all_devices` is the last enumeration snapshot taken from the host and
//! `connected` the subset currently attached to this VM.  Because enumeration
//! is a snapshot, `connected ⊆ all_devices` is not enforced at every instant;
//! it converges once in-flight operations commit.
//!
//! The busy flag is advisory.  It tells observers that an attach, detach or
//! refresh is in flight; it does not stop a second operation from starting.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::device::UsbHandle;

/// A USB device as reported by the host enumeration service.
///
/// Identity is the handle; name and ids are descriptive payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbDevice {
    pub handle: UsbHandle,
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDevice {
    pub fn new(handle: UsbHandle, name: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            handle,
            name: name.into(),
            vendor_id,
            product_id,
        }
    }
}

impl PartialEq for UsbDevice {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for UsbDevice {}

impl Hash for UsbDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x}, {})",
            self.name, self.vendor_id, self.product_id, self.handle
        )
    }
}

/// USB snapshot lists plus the in-flight operation counter behind `busy`.
#[derive(Debug, Default, Clone)]
pub struct UsbState {
    all_devices: Vec<UsbDevice>,
    connected: Vec<UsbDevice>,
    most_recently_connected: Option<UsbHandle>,
    in_flight: u32,
}

impl UsbState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while at least one operation has started and not yet committed.
    pub fn busy(&self) -> bool {
        self.in_flight > 0
    }

    /// Records the start of an operation.
    pub fn begin_operation(&mut self) {
        self.in_flight += 1;
    }

    /// Records the commit of an operation.
    pub fn finish_operation(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Replaces the enumeration snapshot.
    pub fn replace_all(&mut self, devices: Vec<UsbDevice>) {
        self.all_devices = devices;
    }

    /// Adds `device` to the connected set (once) and makes it the most recent.
    pub fn mark_connected(&mut self, device: UsbDevice) {
        self.most_recently_connected = Some(device.handle);
        if !self.connected.contains(&device) {
            self.connected.push(device);
        }
    }

    /// Removes `device` from the connected set.  Absent devices are a no-op.
    pub fn mark_disconnected(&mut self, device: &UsbDevice) -> bool {
        let before = self.connected.len();
        self.connected.retain(|d| d != device);
        if self.most_recently_connected == Some(device.handle) {
            self.most_recently_connected = None;
        }
        self.connected.len() != before
    }

    /// Drops both snapshots.  In-flight operations keep counting.
    pub fn clear_snapshots(&mut self) {
        self.all_devices.clear();
        self.connected.clear();
        self.most_recently_connected = None;
    }

    pub fn all_devices(&self) -> &[UsbDevice] {
        &self.all_devices
    }

    pub fn connected(&self) -> &[UsbDevice] {
        &self.connected
    }

    pub fn is_connected(&self, device: &UsbDevice) -> bool {
        self.connected.contains(device)
    }

    /// The most recently connected device, resolved against the enumeration
    /// snapshot and then the connected list.
    pub fn most_recently_connected(&self) -> Option<&UsbDevice> {
        let handle = self.most_recently_connected?;
        self.all_devices
            .iter()
            .chain(self.connected.iter())
            .find(|d| d.handle == handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(n: u64) -> UsbDevice {
        UsbDevice::new(UsbHandle(n), format!("device-{n}"), 0x1d6b, n as u16)
    }

    #[test]
    fn test_usb_devices_compare_by_handle_only() {
        let a = UsbDevice::new(UsbHandle(1), "Keyboard", 1, 2);
        let b = UsbDevice::new(UsbHandle(1), "renamed", 3, 4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_busy_tracks_overlapping_operations() {
        let mut state = UsbState::new();
        assert!(!state.busy());

        state.begin_operation();
        state.begin_operation();
        state.finish_operation();
        assert!(state.busy(), "one operation still in flight");

        state.finish_operation();
        assert!(!state.busy());
    }

    #[test]
    fn test_finish_without_begin_does_not_underflow() {
        let mut state = UsbState::new();
        state.finish_operation();
        assert!(!state.busy());
    }

    #[test]
    fn test_mark_connected_deduplicates_and_sets_most_recent() {
        let mut state = UsbState::new();
        state.replace_all(vec![usb(1), usb(2)]);

        state.mark_connected(usb(1));
        state.mark_connected(usb(2));
        state.mark_connected(usb(1));

        assert_eq!(state.connected(), &[usb(1), usb(2)]);
        assert_eq!(state.most_recently_connected(), Some(&usb(1)));
    }

    #[test]
    fn test_mark_disconnected_is_idempotent() {
        let mut state = UsbState::new();
        state.mark_connected(usb(1));

        assert!(state.mark_disconnected(&usb(1)));
        assert!(!state.mark_disconnected(&usb(1)));
        assert!(state.connected().is_empty());
        assert_eq!(state.most_recently_connected(), None);
    }

    #[test]
    fn test_most_recent_falls_back_to_connected_list() {
        let mut state = UsbState::new();
        state.mark_connected(usb(5));
        assert_eq!(state.most_recently_connected(), Some(&usb(5)));
    }

    #[test]
    fn test_clear_snapshots_keeps_busy_counter() {
        let mut state = UsbState::new();
        state.replace_all(vec![usb(1)]);
        state.mark_connected(usb(1));
        state.begin_operation();

        state.clear_snapshots();

        assert!(state.all_devices().is_empty());
        assert!(state.connected().is_empty());
        assert!(state.busy());
    }

    #[test]
    fn test_display_includes_ids_and_handle() {
        let device = UsbDevice::new(UsbHandle(0x2a), "Flash Drive", 0x0781, 0x5567);
        assert_eq!(device.to_string(), "Flash Drive (0781:5567, usb:2a)");
    }
}
