//! Window registry: the ordered set of open UI windows.
//!
//! Windows are opaque identifiers handed to the coordinator by the UI shell.
//! Registration order matters: it is the tie-break the binder uses when it
//! looks for the first free window.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of an open UI window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(Uuid);

impl WindowId {
    /// Allocates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for WindowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Ordered list of open windows plus the designated primary and active window.
///
/// Invariant: the list holds no duplicates, and `primary` / `active`, when
/// set, always name a window in the list.
#[derive(Debug, Default, Clone)]
pub struct WindowRegistry {
    windows: Vec<WindowId>,
    primary: Option<WindowId>,
    active: Option<WindowId>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a window.
    ///
    /// Returns `false` if the window was already registered.  The first window
    /// registered into an empty slot becomes primary and/or active.
    pub fn register(&mut self, id: WindowId) -> bool {
        if self.windows.contains(&id) {
            return false;
        }
        self.windows.push(id);
        if self.primary.is_none() {
            self.primary = Some(id);
        }
        if self.active.is_none() {
            self.active = Some(id);
        }
        true
    }

    /// Removes a window.
    ///
    /// If the removed window was primary or active, that role falls back to
    /// the new first window in registration order (or none if empty).
    /// Returns `false` if the window was not registered.
    pub fn remove(&mut self, id: WindowId) -> bool {
        let before = self.windows.len();
        self.windows.retain(|w| *w != id);
        if self.windows.len() == before {
            return false;
        }
        let fallback = self.first();
        if self.primary == Some(id) {
            self.primary = fallback;
        }
        if self.active == Some(id) {
            self.active = fallback;
        }
        true
    }

    /// Marks a registered window as active.  Unknown ids are ignored.
    pub fn set_active(&mut self, id: WindowId) -> bool {
        if !self.windows.contains(&id) {
            return false;
        }
        self.active = Some(id);
        true
    }

    pub fn primary(&self) -> Option<WindowId> {
        self.primary
    }

    pub fn active(&self) -> Option<WindowId> {
        self.active
    }

    /// The earliest-registered window still open.
    pub fn first(&self) -> Option<WindowId> {
        self.windows.first().copied()
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.contains(&id)
    }

    /// Windows in registration order.
    pub fn iter(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.windows.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn to_vec(&self) -> Vec<WindowId> {
        self.windows.clone()
    }
}
