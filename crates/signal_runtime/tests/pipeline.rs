//! Pipeline actor behaviour on a paused tokio clock.
//!
//! Timing tests run with `start_paused`, so the runtime jumps straight to the
//! next heartbeat or auto-clear deadline whenever all tasks are idle and the
//! timings asserted below are exact. The stop cut-off test needs real worker
//! threads and runs on the multi-thread runtime instead.

use std::sync::Arc;
use std::time::Duration;

use signal_core::test_fixtures::{light_payload, raw, tagged_payload};
use signal_core::{ClearReason, Direction, DisplayUpdate, PipelineConfig, SignalStatus};
use signal_runtime::{FnSink, LocalBroadcastSource, PipelineError, TrafficLightPipeline};
use tokio::sync::mpsc;
use tokio::time::Instant;

struct Harness {
    source: Arc<LocalBroadcastSource>,
    pipeline: TrafficLightPipeline,
    updates: mpsc::UnboundedReceiver<DisplayUpdate>,
}

fn harness(config: PipelineConfig) -> Harness {
    let source = Arc::new(LocalBroadcastSource::new());
    let (tx, updates) = mpsc::unbounded_channel();
    let sink = Arc::new(FnSink(move |update: DisplayUpdate| {
        let _ = tx.send(update);
    }));
    let pipeline = TrafficLightPipeline::new(config, source.clone(), sink);
    Harness {
        source,
        pipeline,
        updates,
    }
}

/// Config with an expiry window long enough that the heartbeat stays quiet.
fn no_stale_config() -> PipelineConfig {
    PipelineConfig {
        expire_window_ms: 600_000,
        ..PipelineConfig::default()
    }
}

fn channel() -> String {
    PipelineConfig::default().channel
}

async fn next(h: &mut Harness) -> DisplayUpdate {
    h.updates.recv().await.expect("sink channel closed")
}

fn assert_clear(update: &DisplayUpdate, expected: ClearReason) {
    assert_eq!(update, &DisplayUpdate::Clear { reason: expected });
}

#[tokio::test(start_paused = true)]
async fn broadcast_payload_reaches_sink() {
    let mut h = harness(PipelineConfig::default());
    h.pipeline.start().unwrap();

    assert_eq!(h.source.publish(&channel(), &light_payload(1, 12, 1)), 1);
    let update = next(&mut h).await;
    let signal = update.signal().expect("expected a signal");
    assert_eq!(signal.status, SignalStatus::Red);
    assert_eq!(signal.countdown, 12);
    assert_eq!(signal.direction, Direction::Left);
}

#[tokio::test(start_paused = true)]
async fn ambiguous_direction_uses_previous_lane() {
    let mut h = harness(PipelineConfig::default());
    h.pipeline.start().unwrap();

    h.source.publish(&channel(), &light_payload(1, 12, 1));
    next(&mut h).await;
    h.source.publish(&channel(), &light_payload(4, 3, 0));
    let update = next(&mut h).await;
    let signal = update.signal().unwrap();
    assert_eq!(signal.status, SignalStatus::Green);
    assert_eq!(signal.countdown, 3);
    assert_eq!(signal.direction, Direction::Left);
}

#[tokio::test(start_paused = true)]
async fn foreign_payload_is_ignored() {
    let mut h = harness(no_stale_config());
    h.pipeline.start().unwrap();

    h.source.publish(&channel(), &tagged_payload(1, 1, 12, 1));
    let snapshot = h.pipeline.snapshot().await.unwrap();
    assert_eq!(snapshot.direction_history, Direction::Straight);
    assert_eq!(snapshot.last_valid_event_ms, 0);
    assert_eq!(snapshot.next_auto_clear_ms, None);

    let quiet = tokio::time::timeout(Duration::from_secs(30), h.updates.recv()).await;
    assert!(quiet.is_err(), "foreign payload must not emit anything");
}

#[tokio::test(start_paused = true)]
async fn red_twenty_auto_clears_after_twenty_five_seconds() {
    let mut h = harness(no_stale_config());
    h.pipeline.start().unwrap();

    let t0 = Instant::now();
    h.pipeline.inject(raw(1, 20, 1)).unwrap();
    assert!(next(&mut h).await.signal().is_some());

    let update = next(&mut h).await;
    assert_clear(&update, ClearReason::AutoClear);
    assert_eq!(t0.elapsed(), Duration::from_secs(25));
}

#[tokio::test(start_paused = true)]
async fn zero_countdown_auto_clears_after_fifteen_seconds() {
    let mut h = harness(no_stale_config());
    h.pipeline.start().unwrap();

    let t0 = Instant::now();
    h.pipeline.inject(raw(2, 0, 4)).unwrap();
    next(&mut h).await;

    let update = next(&mut h).await;
    assert_clear(&update, ClearReason::AutoClear);
    assert_eq!(t0.elapsed(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn new_signal_replaces_pending_auto_clear() {
    let mut h = harness(no_stale_config());
    h.pipeline.start().unwrap();

    let t0 = Instant::now();
    h.pipeline.inject(raw(1, 20, 1)).unwrap();
    next(&mut h).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    h.pipeline.inject(raw(1, 5, 1)).unwrap();
    next(&mut h).await;

    let update = next(&mut h).await;
    assert_clear(&update, ClearReason::AutoClear);
    assert_eq!(t0.elapsed(), Duration::from_secs(20));

    // The original 25 s deadline was cancelled and never fires.
    let quiet = tokio::time::timeout(Duration::from_secs(30), h.updates.recv()).await;
    assert!(quiet.is_err());
}

#[tokio::test(start_paused = true)]
async fn stale_heartbeat_clears_exactly_once() {
    let mut h = harness(PipelineConfig::default());
    h.pipeline.start().unwrap();

    let t0 = Instant::now();
    h.pipeline.inject(raw(1, 60, 2)).unwrap();
    next(&mut h).await;

    let update = next(&mut h).await;
    assert_clear(&update, ClearReason::Stale);
    assert_eq!(t0.elapsed(), Duration::from_secs(11));
    let snapshot = h.pipeline.snapshot().await.unwrap();
    assert_eq!(snapshot.direction_history, Direction::Straight);

    // Only the 65 s auto-clear remains; no repeated stale clears.
    let update = next(&mut h).await;
    assert_clear(&update, ClearReason::AutoClear);
    assert_eq!(t0.elapsed(), Duration::from_secs(65));
    let quiet = tokio::time::timeout(Duration::from_secs(120), h.updates.recv()).await;
    assert!(quiet.is_err());
}

#[tokio::test(start_paused = true)]
async fn stale_sweep_runs_without_any_signal() {
    let mut h = harness(PipelineConfig::default());
    let t0 = Instant::now();
    h.pipeline.start().unwrap();

    let update = next(&mut h).await;
    assert_clear(&update, ClearReason::Stale);
    assert_eq!(t0.elapsed(), Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn invalid_signal_keeps_heartbeat_quiet() {
    let mut h = harness(PipelineConfig::default());
    h.pipeline.start().unwrap();

    // Status 9 normalizes to no signal: nothing emitted, liveness refreshed.
    for _ in 0..3 {
        h.pipeline.inject(raw(9, 0, 0)).unwrap();
        tokio::time::sleep(Duration::from_secs(8)).await;
    }
    assert!(h.updates.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn start_twice_registers_once() {
    let h = harness(PipelineConfig::default());
    h.pipeline.start().unwrap();
    h.pipeline.start().unwrap();
    assert!(h.pipeline.is_registered());
    assert_eq!(h.source.subscriber_count(&channel()), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_twice_is_safe() {
    let h = harness(PipelineConfig::default());
    h.pipeline.start().unwrap();
    h.pipeline.stop();
    h.pipeline.stop();
    assert!(!h.pipeline.is_registered());
    assert_eq!(h.source.subscriber_count(&channel()), 0);
    assert!(matches!(
        h.pipeline.inject(raw(1, 5, 1)),
        Err(PipelineError::NotRunning)
    ));
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_pending_timers() {
    let mut h = harness(PipelineConfig::default());
    h.pipeline.start().unwrap();
    h.pipeline.inject(raw(1, 20, 1)).unwrap();
    next(&mut h).await;

    h.pipeline.stop();
    let quiet = tokio::time::timeout(Duration::from_secs(120), h.updates.recv()).await;
    assert!(quiet.is_err(), "no clear may fire after stop");
}

#[tokio::test(start_paused = true)]
async fn restart_forgets_direction_history() {
    let mut h = harness(PipelineConfig::default());
    h.pipeline.start().unwrap();
    h.pipeline.inject(raw(1, 12, 1)).unwrap();
    next(&mut h).await;
    assert_eq!(
        h.pipeline.snapshot().await.unwrap().direction_history,
        Direction::Left
    );

    h.pipeline.stop();
    h.pipeline.start().unwrap();
    let snapshot = h.pipeline.snapshot().await.unwrap();
    assert_eq!(snapshot.direction_history, Direction::Straight);
    assert_eq!(snapshot.next_auto_clear_ms, None);

    h.pipeline.inject(raw(2, 0, 0)).unwrap();
    let update = next(&mut h).await;
    assert_eq!(update.signal().unwrap().direction, Direction::Straight);
}

#[tokio::test(start_paused = true)]
async fn registration_failure_leaves_pipeline_stopped() {
    let mut h = harness(PipelineConfig::default());
    h.source.set_closed(true);

    let err = h.pipeline.start().unwrap_err();
    assert!(matches!(err, PipelineError::Registration { .. }));
    assert!(!h.pipeline.is_registered());

    // No heartbeat was started, so no stale clear ever arrives.
    let quiet = tokio::time::timeout(Duration::from_secs(30), h.updates.recv()).await;
    assert!(quiet.is_err());

    h.source.set_closed(false);
    h.pipeline.start().unwrap();
    assert!(h.pipeline.is_registered());
}

#[tokio::test(start_paused = true)]
async fn deliveries_from_other_threads_are_serialised() {
    let mut h = harness(no_stale_config());
    h.pipeline.start().unwrap();

    let source = h.source.clone();
    let ch = channel();
    std::thread::spawn(move || {
        for countdown in 1..=20 {
            source.publish(&ch, &light_payload(1, countdown, 1));
        }
    })
    .join()
    .unwrap();

    let mut countdowns = Vec::new();
    for _ in 0..20 {
        countdowns.push(next(&mut h).await.signal().unwrap().countdown);
    }
    assert_eq!(countdowns, (1..=20).collect::<Vec<u32>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_cuts_off_queued_signals_while_sink_is_busy() {
    let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let entered_tx = parking_lot::Mutex::new(entered_tx);
    let release_rx = parking_lot::Mutex::new(release_rx);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let sink_seen = Arc::clone(&seen);
    let sink = Arc::new(FnSink(move |update: DisplayUpdate| {
        sink_seen.lock().push(update);
        let _ = entered_tx.lock().send(());
        // Hold the actor inside the sink until the test releases it.
        let _ = release_rx.lock().recv();
    }));
    let source = Arc::new(LocalBroadcastSource::new());
    let pipeline = TrafficLightPipeline::new(no_stale_config(), source, sink);
    pipeline.start().unwrap();

    pipeline.inject(raw(1, 20, 1)).unwrap();
    pipeline.inject(raw(1, 19, 2)).unwrap();
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .expect("first signal never reached the sink");

    pipeline.stop();
    assert!(!pipeline.is_registered());
    drop(release_tx);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let countdowns: Vec<u32> = seen
        .lock()
        .iter()
        .filter_map(|u| u.signal().map(|s| s.countdown))
        .collect();
    assert_eq!(countdowns, vec![20], "queued signal leaked past stop()");
}
