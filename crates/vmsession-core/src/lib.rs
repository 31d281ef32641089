//! # vmsession-core
//!
//! Domain layer of the VM session coordinator.
//!
//! A running VM exposes a changing set of devices (displays, serial
//! terminals, USB endpoints) and the UI shows them in a changing set of
//! windows.  This crate holds the state that links the two and the rules that
//! keep it consistent:
//!
//! - **`domain::device`** – structural device identity, the device registry,
//!   and serial terminal name parsing.
//! - **`domain::window`** – ordered window registry with primary/active roles.
//! - **`domain::binding`** – the greedy "next device takes the first free
//!   window" binder.
//! - **`domain::lifecycle`** – run state and the effects of a transition.
//! - **`domain::usb`** – USB enumeration snapshot, connected set, busy gate.
//!
//! The crate is synchronous and free of I/O; the coordinator crate drives it
//! from a single actor task.

pub mod domain;

pub use domain::binding::Binder;
pub use domain::device::{
    parse_terminal_port, Device, DeviceError, DeviceHandle, DeviceRegistry, MachineLayout,
    UsbHandle,
};
pub use domain::lifecycle::{Lifecycle, PauseResume, RunState, TransitionEffect};
pub use domain::usb::{UsbDevice, UsbState};
pub use domain::window::{WindowId, WindowRegistry};
