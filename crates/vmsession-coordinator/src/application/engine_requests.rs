//! Fire-and-forget lifecycle requests to the VM engine.
//!
//! None of these block the actor: each request runs on its own spawned task.
//! A failed request is reported back to the actor as a non-fatal error
//! message; it never propagates to the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::events::Message;
use super::ports::{EngineError, HostControl, VmEngine};

/// Issues engine and host requests on background tasks.
pub(crate) struct EngineRequests {
    engine: Arc<dyn VmEngine>,
    host: Arc<dyn HostControl>,
    terminate_grace: Duration,
    failures: mpsc::UnboundedSender<Message>,
}

impl EngineRequests {
    pub(crate) fn new(
        engine: Arc<dyn VmEngine>,
        host: Arc<dyn HostControl>,
        terminate_grace: Duration,
        failures: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            engine,
            host,
            terminate_grace,
            failures,
        }
    }

    /// Deletes the saved state, stops the VM, then terminates the host.
    ///
    /// Termination is two-phase: the host is moved to the background, and
    /// after the grace interval it exits.  Failures of the engine steps are
    /// reported but do not prevent termination.
    pub(crate) fn power_down(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let host = Arc::clone(&self.host);
        let grace = self.terminate_grace;
        let failures = self.failures.clone();

        tokio::spawn(async move {
            if let Err(e) = engine.delete_saved_state().await {
                report(&failures, "delete saved state", &e);
            }
            if let Err(e) = engine.stop().await {
                report(&failures, "stop", &e);
            }
            info!(grace_ms = grace.as_millis() as u64, "VM stopped; terminating host");
            host.move_to_background();
            tokio::time::sleep(grace).await;
            host.terminate();
        })
    }

    pub(crate) fn pause(&self, save_state: bool) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let failures = self.failures.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.pause(save_state).await {
                report(&failures, "pause", &e);
            }
        })
    }

    pub(crate) fn resume(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let failures = self.failures.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.resume().await {
                report(&failures, "resume", &e);
            }
        })
    }

    pub(crate) fn reset(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let failures = self.failures.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.reset().await {
                report(&failures, "reset", &e);
            }
        })
    }
}

fn report(failures: &mpsc::UnboundedSender<Message>, request: &str, err: &EngineError) {
    let message = format!("{request} request failed: {err}");
    if failures.send(Message::RequestFailed(message)).is_err() {
        debug!("coordinator gone; dropping {request} failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockHostControl, MockVmEngine};
    use mockall::Sequence;

    fn requests(
        engine: MockVmEngine,
        host: MockHostControl,
    ) -> (EngineRequests, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let requests = EngineRequests::new(
            Arc::new(engine),
            Arc::new(host),
            Duration::from_millis(5),
            tx,
        );
        (requests, rx)
    }

    #[tokio::test]
    async fn test_power_down_runs_steps_in_order() {
        // Arrange
        let mut seq = Sequence::new();
        let mut engine = MockVmEngine::new();
        let mut host = MockHostControl::new();
        engine
            .expect_delete_saved_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        engine
            .expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        host.expect_move_to_background()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        host.expect_terminate()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        let (requests, mut rx) = requests(engine, host);

        // Act
        requests.power_down().await.expect("task must not panic");

        // Assert
        assert!(rx.try_recv().is_err(), "no failure expected");
    }

    #[tokio::test]
    async fn test_power_down_terminates_even_when_stop_fails() {
        let mut engine = MockVmEngine::new();
        let mut host = MockHostControl::new();
        engine
            .expect_delete_saved_state()
            .returning(|| Err(EngineError::Rejected("no saved state".to_string())));
        engine.expect_stop().returning(|| Err(EngineError::Detached));
        host.expect_move_to_background().times(1).return_const(());
        host.expect_terminate().times(1).return_const(());
        let (requests, mut rx) = requests(engine, host);

        requests.power_down().await.expect("task must not panic");

        let mut failures = Vec::new();
        while let Ok(Message::RequestFailed(m)) = rx.try_recv() {
            failures.push(m);
        }
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("delete saved state request failed"));
        assert!(failures[1].starts_with("stop request failed"));
    }

    #[tokio::test]
    async fn test_pause_passes_save_flag() {
        let mut engine = MockVmEngine::new();
        engine
            .expect_pause()
            .withf(|save| !*save)
            .times(1)
            .returning(|_| Ok(()));
        let (requests, mut rx) = requests(engine, MockHostControl::new());

        requests.pause(false).await.expect("task must not panic");

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_reset_is_reported_as_message() {
        let mut engine = MockVmEngine::new();
        engine
            .expect_reset()
            .returning(|| Err(EngineError::Rejected("busy".to_string())));
        let (requests, mut rx) = requests(engine, MockHostControl::new());

        requests.reset().await.expect("task must not panic");

        match rx.try_recv() {
            Ok(Message::RequestFailed(m)) => {
                assert_eq!(m, "reset request failed: engine rejected request: busy")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resume_calls_engine_once() {
        let mut engine = MockVmEngine::new();
        engine.expect_resume().times(1).returning(|| Ok(()));
        let (requests, _rx) = requests(engine, MockHostControl::new());

        requests.resume().await.expect("task must not panic");
    }
}
