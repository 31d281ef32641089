//! Recording engine and host doubles.
//!
//! Used by integration tests to observe which requests the coordinator sent,
//! in what order, and to inject engine failures.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::application::ports::{EngineError, HostControl, VmEngine};

/// A request observed by [`RecordingEngine`] or [`RecordingHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRequest {
    DeleteSavedState,
    Stop,
    Pause { save_state: bool },
    Resume,
    Reset,
    MoveToBackground,
    Terminate,
}

/// Shared, ordered log of requests.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    entries: Arc<Mutex<Vec<EngineRequest>>>,
    changed: Arc<Notify>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, request: EngineRequest) {
        self.entries.lock().expect("lock poisoned").push(request);
        self.changed.notify_waiters();
    }

    /// All requests recorded so far, oldest first.
    pub fn entries(&self) -> Vec<EngineRequest> {
        self.entries.lock().expect("lock poisoned").clone()
    }

    /// Waits until `request` has been recorded.
    pub async fn wait_for(&self, request: EngineRequest) {
        loop {
            let changed = self.changed.notified();
            if self.entries().contains(&request) {
                return;
            }
            changed.await;
        }
    }
}

/// A [`VmEngine`] that records every request and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    log: RequestLog,
    failing: Arc<Mutex<Vec<EngineRequest>>>,
}

impl RecordingEngine {
    /// Creates an engine that writes to `log`.
    pub fn new(log: RequestLog) -> Self {
        Self {
            log,
            failing: Arc::default(),
        }
    }

    /// Makes every later `request` of this kind fail with [`EngineError::Rejected`].
    pub fn fail_on(&self, request: EngineRequest) {
        self.failing.lock().expect("lock poisoned").push(request);
    }

    fn record(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.log.push(request);
        if self.failing.lock().expect("lock poisoned").contains(&request) {
            Err(EngineError::Rejected(format!("{request:?} refused")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VmEngine for RecordingEngine {
    async fn delete_saved_state(&self) -> Result<(), EngineError> {
        self.record(EngineRequest::DeleteSavedState)
    }

    async fn stop(&self) -> Result<(), EngineError> {
        self.record(EngineRequest::Stop)
    }

    async fn pause(&self, save_state: bool) -> Result<(), EngineError> {
        self.record(EngineRequest::Pause { save_state })
    }

    async fn resume(&self) -> Result<(), EngineError> {
        self.record(EngineRequest::Resume)
    }

    async fn reset(&self) -> Result<(), EngineError> {
        self.record(EngineRequest::Reset)
    }
}

/// A [`HostControl`] that records instead of exiting.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    log: RequestLog,
}

impl RecordingHost {
    pub fn new(log: RequestLog) -> Self {
        Self { log }
    }
}

impl HostControl for RecordingHost {
    fn move_to_background(&self) {
        self.log.push(EngineRequest::MoveToBackground);
    }

    fn terminate(&self) {
        self.log.push(EngineRequest::Terminate);
    }
}
