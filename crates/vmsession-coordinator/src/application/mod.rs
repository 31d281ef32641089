//! Application layer: the session coordinator and its ports.
//!
//! This layer turns raw engine callbacks and observer commands into ordered
//! mutations of one [`Session`](session::Session), and talks to the outside
//! world only through the traits in [`ports`].
//!
//! # Sub-modules
//!
//! - **`session`** – The mutable state: registries, binder, lifecycle, USB.
//!   Synchronous; enforces the binding invariant after every call.
//!
//! - **`coordinator`** – The actor task that owns the `Session`, plus the
//!   cloneable [`SessionHandle`](coordinator::SessionHandle) observers use.
//!
//! - **`usb_gate`** – Start / run / commit protocol for long USB operations.
//!
//! - **`engine_requests`** – Fire-and-forget power-down, pause, resume and
//!   reset requests.
//!
//! - **`events`** / **`ports`** – Message types and outbound traits.

pub mod coordinator;
pub(crate) mod engine_requests;
pub mod events;
pub mod ports;
pub mod session;
pub mod usb_gate;
