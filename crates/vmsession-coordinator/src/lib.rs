//! vmsession-coordinator library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;

pub use application::coordinator::{Coordinator, CoordinatorConfig, CoordinatorError, SessionHandle};
pub use application::session::SessionSnapshot;
pub use application::usb_gate::UsbGateError;
pub use infrastructure::ingress::{EngineCallbacks, EventIngress, UsbCallbacks};
