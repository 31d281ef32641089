//! Criterion benchmarks for the [`Binder`] repair pass.
//!
//! The repair pass runs inside the coordinator actor on every device or window
//! event, so it must stay cheap even with many open windows.
//!
//! Run with:
//! ```bash
//! cargo bench --package vmsession-core --bench binder_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vmsession_core::{Binder, Device, DeviceHandle, WindowId, WindowRegistry};

// ── Fixture builders ──────────────────────────────────────────────────────────

fn display(monitor_index: u32) -> Device {
    Device::Display {
        handle: DeviceHandle(monitor_index as u64),
        monitor_index,
    }
}

/// Creates `n` windows with all but the last one already bound, so the
/// next device arrival scans to the end of the list (worst case).
fn build_nearly_full(n: usize) -> (WindowRegistry, Binder) {
    let mut windows = WindowRegistry::new();
    for _ in 0..n {
        windows.register(WindowId::new());
    }
    let mut binder = Binder::new();
    for i in 0..n.saturating_sub(1) {
        binder.on_device_added(&windows, &display(i as u32));
    }
    (windows, binder)
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

/// Measures a device arrival that claims the last free window.
fn bench_device_added_worst_case(c: &mut Criterion) {
    let mut group = c.benchmark_group("binder_device_added");

    for &count in &[1usize, 4, 16, 64] {
        let (windows, binder) = build_nearly_full(count);
        let incoming = display(count as u32);

        group.bench_with_input(BenchmarkId::new("windows", count), &count, |b, _| {
            b.iter(|| {
                let mut binder = binder.clone();
                binder.on_device_added(black_box(&windows), black_box(&incoming))
            })
        });
    }

    group.finish();
}

/// Measures unbinding a device shown in one of many windows.
fn bench_device_removed(c: &mut Criterion) {
    let mut group = c.benchmark_group("binder_device_removed");

    for &count in &[4usize, 16, 64] {
        let (windows, mut binder) = build_nearly_full(count + 1);
        let target = display(count as u32 / 2);
        binder.on_device_added(&windows, &display(count as u32));

        group.bench_with_input(BenchmarkId::new("windows", count), &count, |b, _| {
            b.iter(|| {
                let mut binder = binder.clone();
                binder.on_device_removed(black_box(&target))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_device_added_worst_case, bench_device_removed);
criterion_main!(benches);
