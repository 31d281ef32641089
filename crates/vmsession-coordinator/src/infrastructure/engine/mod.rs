//! Engine and host adapters.
//!
//! The coordinator reaches the VM engine and the hosting process only through
//! the [`VmEngine`] and [`HostControl`] ports.  This module provides the
//! adapters used when no real engine is attached (the headless binary), and
//! a `mock` sub-module with recording doubles for tests.

use async_trait::async_trait;
use tracing::info;

use crate::application::ports::{EngineError, HostControl, VmEngine};

pub mod mock;

/// Engine adapter for a coordinator with no engine behind it.
///
/// Every request is logged and acknowledged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedEngine;

#[async_trait]
impl VmEngine for DetachedEngine {
    async fn delete_saved_state(&self) -> Result<(), EngineError> {
        info!("engine request: delete saved state");
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        info!("engine request: stop");
        Ok(())
    }

    async fn pause(&self, save_state: bool) -> Result<(), EngineError> {
        info!(save_state, "engine request: pause");
        Ok(())
    }

    async fn resume(&self) -> Result<(), EngineError> {
        info!("engine request: resume");
        Ok(())
    }

    async fn reset(&self) -> Result<(), EngineError> {
        info!("engine request: reset");
        Ok(())
    }
}

/// Host control for the current process.
///
/// A headless process has nothing to background; `terminate` exits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessHost;

impl HostControl for ProcessHost {
    fn move_to_background(&self) {
        info!("host moved to background");
    }

    fn terminate(&self) {
        info!("host terminating");
        std::process::exit(0);
    }
}
