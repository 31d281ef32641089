//! USB transport adapters.
//!
//! Real passthrough lives with the engine; it hands the coordinator an
//! implementation of [`UsbTransport`](crate::application::ports::UsbTransport)
//! through the "transport changed" callback.  Only the test double is here.

pub mod mock;
