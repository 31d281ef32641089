//! Domain entities for the VM session coordinator.
//!
//! Everything in here is plain data plus the rules that keep it consistent.
//! There is no async runtime, no channel and no I/O: the coordinator crate
//! owns one instance of each type inside its single-writer actor and calls
//! these methods from there.

/// Devices, their structural identity, and the device registry.
pub mod device;

/// The window → device binding policy.
pub mod binding;

/// VM run state and transition side effects.
pub mod lifecycle;

/// USB passthrough snapshots and the busy gate.
pub mod usb;

/// Open windows plus primary / active designation.
pub mod window;
