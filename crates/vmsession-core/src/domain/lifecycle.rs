//! VM run-state tracking.
//!
//! Transitions are reported by the engine; the coordinator never invents one.
//! The only thing this module decides is which side effects a reported
//! transition carries.
//!
//! ```text
//! Stopped ──► Starting ──► Started ──► Pausing ──► Paused
//!    ▲                        │                       │
//!    └──────── Stopping ◄─────┴───────────────────────┘
//!                 │
//!                 └──► StoppedWithError
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Run state of the VM instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Stopped,
    Starting,
    Started,
    Pausing,
    Paused,
    Stopping,
    /// Stopped because the engine hit an error.
    StoppedWithError,
}

impl RunState {
    /// Both stopped variants count as stopped.
    pub fn is_stopped(self) -> bool {
        matches!(self, RunState::Stopped | RunState::StoppedWithError)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Stopped => "stopped",
            RunState::Starting => "starting",
            RunState::Started => "started",
            RunState::Pausing => "pausing",
            RunState::Paused => "paused",
            RunState::Stopping => "stopping",
            RunState::StoppedWithError => "stopped(error)",
        };
        f.write_str(s)
    }
}

/// Side effects attached to a committed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionEffect {
    /// The VM just stopped: devices, bindings and USB snapshots must be cleared.
    pub clears_devices: bool,
    /// A new run is starting: a fatal error from the previous run is stale.
    pub clears_fatal_error: bool,
}

/// What a pause/resume toggle should ask the engine for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseResume {
    Pause { save_state: bool },
    Resume,
}

/// Tracks the current run state.
#[derive(Debug, Default, Clone)]
pub struct Lifecycle {
    state: RunState,
    restored_from_snapshot: bool,
}

impl Lifecycle {
    /// Creates a tracker in the `Stopped` state.
    ///
    /// `restored_from_snapshot` marks an instance that was booted from a saved
    /// state; pausing such an instance does not save again.
    pub fn new(restored_from_snapshot: bool) -> Self {
        Self {
            state: RunState::Stopped,
            restored_from_snapshot,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn restored_from_snapshot(&self) -> bool {
        self.restored_from_snapshot
    }

    /// Commits an engine-reported state and returns its side effects.
    ///
    /// Device clearing happens once per stop: only when entering a stopped
    /// state from a non-stopped one.
    pub fn transition(&mut self, next: RunState) -> TransitionEffect {
        let previous = self.state;
        self.state = next;
        TransitionEffect {
            clears_devices: next.is_stopped() && !previous.is_stopped(),
            clears_fatal_error: next == RunState::Starting && previous != RunState::Starting,
        }
    }

    /// Decides the pause/resume request for the current state.
    ///
    /// A running VM is paused, saving state unless it runs from a restored
    /// snapshot; a paused VM is resumed.  Other states have no toggle.
    pub fn pause_resume(&self) -> Option<PauseResume> {
        match self.state {
            RunState::Started => Some(PauseResume::Pause {
                save_state: !self.restored_from_snapshot,
            }),
            RunState::Paused => Some(PauseResume::Resume),
            _ => None,
        }
    }
}
