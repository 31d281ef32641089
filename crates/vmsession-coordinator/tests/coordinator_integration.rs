//! Integration tests for the session coordinator.
//!
//! These drive the coordinator end-to-end the way a real engine would: every
//! device and lifecycle event enters through `EventIngress`, and every check
//! reads the published snapshot.

use std::sync::Arc;
use std::time::Duration;

use vmsession_coordinator::infrastructure::engine::mock::{
    EngineRequest, RecordingEngine, RecordingHost, RequestLog,
};
use vmsession_coordinator::{
    Coordinator, CoordinatorConfig, EngineCallbacks, EventIngress, SessionHandle,
};
use vmsession_core::{Device, DeviceHandle, MachineLayout, RunState, WindowId};

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Harness {
    handle: SessionHandle,
    ingress: EventIngress,
    engine: RecordingEngine,
    log: RequestLog,
}

fn start(restored_from_snapshot: bool) -> Harness {
    let log = RequestLog::new();
    let engine = RecordingEngine::new(log.clone());
    let config = CoordinatorConfig {
        layout: MachineLayout {
            monitor_count: 4,
            serial_port_count: 4,
        },
        restored_from_snapshot,
        terminal_namespace: "ns".to_string(),
        terminate_grace: Duration::from_millis(1),
    };
    let (handle, _task) = Coordinator::spawn(
        config,
        Arc::new(engine.clone()),
        Arc::new(RecordingHost::new(log.clone())),
    );
    Harness {
        ingress: EventIngress::new(handle.clone()),
        handle,
        engine,
        log,
    }
}

fn display(monitor_index: u32) -> Device {
    Device::Display {
        handle: DeviceHandle(0x100 + monitor_index as u64),
        monitor_index,
    }
}

// ── Binding scenarios ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_displays_fill_windows_in_order_and_reuse_first_free_window() {
    // Arrange
    let h = start(false);
    let (a, b) = (WindowId::new(), WindowId::new());
    h.handle.register_window(a).unwrap();
    h.handle.register_window(b).unwrap();
    h.ingress.state_changed(RunState::Started);

    // Act / Assert: display#0 → A, display#1 → B
    h.ingress.display_created(DeviceHandle(0x100), 0);
    h.ingress.display_created(DeviceHandle(0x101), 1);
    h.handle.sync().await.unwrap();
    let snap = h.handle.snapshot();
    assert_eq!(snap.device_for(a), Some(&display(0)));
    assert_eq!(snap.device_for(b), Some(&display(1)));

    // display#0 destroyed → A free, B unaffected
    h.ingress.display_destroyed(DeviceHandle(0x100), 0);
    h.handle.sync().await.unwrap();
    let snap = h.handle.snapshot();
    assert_eq!(snap.device_for(a), None);
    assert_eq!(snap.device_for(b), Some(&display(1)));

    // display#2 created → A (first free window)
    h.ingress.display_created(DeviceHandle(0x102), 2);
    h.handle.sync().await.unwrap();
    let snap = h.handle.snapshot();
    assert_eq!(snap.device_for(a), Some(&display(2)));
    assert_eq!(snap.device_for(b), Some(&display(1)));
}

#[tokio::test]
async fn test_stop_clears_devices_and_bindings_but_keeps_windows() {
    // Arrange
    let h = start(false);
    let (a, b) = (WindowId::new(), WindowId::new());
    h.handle.register_window(a).unwrap();
    h.handle.register_window(b).unwrap();
    h.ingress.state_changed(RunState::Started);
    h.ingress.display_created(DeviceHandle(1), 0);
    h.ingress.serial_port_created(DeviceHandle(2), "ns.terminal.1");
    h.handle.sync().await.unwrap();
    assert_eq!(h.handle.snapshot().bindings.len(), 2);

    // Act
    h.ingress.state_changed(RunState::Stopping);
    h.ingress.state_changed(RunState::Stopped);
    h.handle.sync().await.unwrap();

    // Assert
    let snap = h.handle.snapshot();
    assert_eq!(snap.state, RunState::Stopped);
    assert!(snap.devices.is_empty());
    assert!(snap.bindings.is_empty());
    assert_eq!(snap.windows, vec![a, b]);
}

#[tokio::test]
async fn test_new_window_does_not_claim_unassigned_device() {
    let h = start(false);
    h.ingress.display_created(DeviceHandle(1), 0);
    h.handle.sync().await.unwrap();

    let a = WindowId::new();
    h.handle.register_window(a).unwrap();
    h.handle.sync().await.unwrap();

    let snap = h.handle.snapshot();
    assert_eq!(snap.devices, vec![display(0)]);
    assert_eq!(snap.device_for(a), None);
}

#[tokio::test]
async fn test_window_removed_before_its_device_is_destroyed() {
    // The window and device go away from different sources; either order
    // must leave a consistent session.
    let h = start(false);
    let a = WindowId::new();
    h.handle.register_window(a).unwrap();
    h.ingress.display_created(DeviceHandle(1), 0);

    h.handle.remove_window(a).unwrap();
    h.ingress.display_destroyed(DeviceHandle(1), 0);
    h.ingress.display_destroyed(DeviceHandle(1), 0);
    h.handle.remove_window(a).unwrap();
    h.handle.sync().await.unwrap();

    let snap = h.handle.snapshot();
    assert!(snap.windows.is_empty());
    assert!(snap.devices.is_empty());
    assert!(snap.bindings.is_empty());
    assert_eq!(snap.primary_window, None);
}

#[tokio::test]
async fn test_display_updated_after_destroy_does_not_resurrect_device() {
    let h = start(false);
    h.ingress.display_created(DeviceHandle(1), 0);
    h.ingress.display_destroyed(DeviceHandle(1), 0);
    h.ingress.display_updated(DeviceHandle(9), 0);
    h.handle.sync().await.unwrap();

    assert!(h.handle.snapshot().devices.is_empty());
}

#[tokio::test]
async fn test_display_outside_machine_layout_is_dropped() {
    let h = start(false);
    h.handle.register_window(WindowId::new()).unwrap();

    h.ingress.display_created(DeviceHandle(1), 4);
    h.handle.sync().await.unwrap();

    let snap = h.handle.snapshot();
    assert!(snap.devices.is_empty());
    assert!(snap.bindings.is_empty());
}

#[tokio::test]
async fn test_serial_name_outside_namespace_is_rejected() {
    let h = start(false);
    h.handle.register_window(WindowId::new()).unwrap();

    h.ingress.serial_port_created(DeviceHandle(7), "other.port");
    h.handle.sync().await.unwrap();

    let snap = h.handle.snapshot();
    assert!(snap.devices.is_empty());
    assert!(snap.last_error.is_some());
}

// ── Lifecycle and engine requests ─────────────────────────────────────────────

#[tokio::test]
async fn test_fatal_error_is_published_and_cleared_on_next_start() {
    let h = start(false);
    h.ingress.state_changed(RunState::Started);
    h.ingress.fatal_error("guest kernel panic");
    h.handle.sync().await.unwrap();
    let snap = h.handle.snapshot();
    assert_eq!(snap.state, RunState::Started);
    assert_eq!(snap.fatal_error.as_deref(), Some("guest kernel panic"));

    h.ingress.state_changed(RunState::StoppedWithError);
    h.ingress.state_changed(RunState::Starting);
    h.handle.sync().await.unwrap();

    assert_eq!(h.handle.snapshot().fatal_error, None);
}

#[tokio::test]
async fn test_power_down_deletes_state_stops_then_terminates_host() {
    let h = start(false);
    h.ingress.state_changed(RunState::Started);

    h.handle.power_down().unwrap();
    h.log.wait_for(EngineRequest::Terminate).await;

    assert_eq!(
        h.log.entries(),
        vec![
            EngineRequest::DeleteSavedState,
            EngineRequest::Stop,
            EngineRequest::MoveToBackground,
            EngineRequest::Terminate,
        ]
    );
}

#[tokio::test]
async fn test_power_down_terminates_even_if_stop_fails() {
    let h = start(false);
    h.engine.fail_on(EngineRequest::Stop);

    h.handle.power_down().unwrap();
    h.log.wait_for(EngineRequest::Terminate).await;

    let snap = h
        .handle
        .wait_for(|s| s.last_error.is_some())
        .await
        .unwrap();
    assert!(snap
        .last_error
        .is_some_and(|m| m.starts_with("stop request failed")));
}

#[tokio::test]
async fn test_pause_resume_toggles_and_skips_save_for_restored_instance() {
    // Arrange
    let h = start(true);
    h.ingress.state_changed(RunState::Started);

    // Act: pause
    h.handle.pause_resume().unwrap();
    h.log
        .wait_for(EngineRequest::Pause { save_state: false })
        .await;

    // Act: the engine reports paused, then resume
    h.ingress.state_changed(RunState::Paused);
    h.handle.pause_resume().unwrap();
    h.log.wait_for(EngineRequest::Resume).await;

    // Assert
    assert_eq!(
        h.log.entries(),
        vec![
            EngineRequest::Pause { save_state: false },
            EngineRequest::Resume
        ]
    );
}

#[tokio::test]
async fn test_pause_saves_state_for_fresh_instance() {
    let h = start(false);
    h.ingress.state_changed(RunState::Started);

    h.handle.pause_resume().unwrap();
    h.log
        .wait_for(EngineRequest::Pause { save_state: true })
        .await;
}

#[tokio::test]
async fn test_failed_reset_is_reported_as_non_fatal_error() {
    let h = start(false);
    h.engine.fail_on(EngineRequest::Reset);

    h.handle.reset().unwrap();

    let snap = h
        .handle
        .wait_for(|s| s.last_error.is_some())
        .await
        .unwrap();
    assert_eq!(snap.fatal_error, None);
    assert!(snap
        .last_error
        .is_some_and(|m| m.starts_with("reset request failed")));
}

#[tokio::test]
async fn test_primary_input_follows_engine_events() {
    let h = start(false);
    h.ingress.input_created(DeviceHandle(3));
    h.ingress.input_created(DeviceHandle(4));
    h.handle.sync().await.unwrap();
    assert_eq!(h.handle.snapshot().primary_input, Some(DeviceHandle(3)));

    h.ingress.input_destroyed(DeviceHandle(3));
    h.handle.sync().await.unwrap();
    assert_eq!(h.handle.snapshot().primary_input, None);
}

#[tokio::test]
async fn test_subscribers_see_committed_changes() {
    let h = start(false);
    let mut updates = h.handle.subscribe();
    updates.borrow_and_update();

    h.handle.register_window(WindowId::new()).unwrap();

    updates.changed().await.unwrap();
    assert_eq!(updates.borrow().windows.len(), 1);
}
