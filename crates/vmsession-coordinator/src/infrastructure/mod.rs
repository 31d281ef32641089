//! Infrastructure layer for the session coordinator.
//!
//! Contains the adapters around the application layer: the engine callback
//! ingress, engine/host and USB transport implementations (plus their test
//! doubles), configuration file loading, and the UI observer bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `vmsession_core`, but MUST NOT be imported by the `application` or domain
//! layers.

pub mod engine;
pub mod ingress;
pub mod storage;
pub mod ui_bridge;
pub mod usb;
