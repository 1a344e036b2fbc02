mod common;

use common::*;
use periscope_peer::pump_frames;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(1);

#[tokio::test(start_paused = true)]
async fn frames_are_sent_at_the_configured_interval_never_faster() {
    init_tracing();
    let channel = Arc::new(MockFrameChannel::default());

    let pump = tokio::spawn(pump_frames(
        Box::new(ScriptedSource::ok()),
        channel.clone(),
        INTERVAL,
    ));

    tokio::time::sleep(INTERVAL * 5 + Duration::from_millis(500)).await;
    pump.abort();

    let sent = channel.sent.lock().unwrap();
    // One frame immediately, then one per interval.
    assert!(
        (5..=6).contains(&sent.len()),
        "expected 5-6 frames, got {}",
        sent.len()
    );
    for pair in sent.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        assert!(gap >= INTERVAL, "frames {gap:?} apart, faster than {INTERVAL:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn capture_failures_are_retried_once_per_interval() {
    init_tracing();
    let channel = Arc::new(MockFrameChannel::default());
    let start = tokio::time::Instant::now();

    let pump = tokio::spawn(pump_frames(
        Box::new(ScriptedSource::failing(3)),
        channel.clone(),
        INTERVAL,
    ));

    tokio::time::sleep(INTERVAL * 4 + Duration::from_millis(500)).await;
    pump.abort();

    let sent = channel.sent.lock().unwrap();
    // Attempts at t=0,1,2 fail; the first frame lands on the fourth tick,
    // exactly one backoff interval per failure.
    assert!(!sent.is_empty(), "retries never produced a frame");
    assert_eq!(sent[0].0 - start, INTERVAL * 3);
    assert_eq!(sent[0].1.as_ref(), b"frame-1");
}

#[tokio::test(start_paused = true)]
async fn send_failure_stops_the_pump() {
    init_tracing();
    let channel = Arc::new(MockFrameChannel::default());
    channel.fail.store(true, Ordering::Relaxed);

    let pump = tokio::spawn(pump_frames(
        Box::new(ScriptedSource::ok()),
        channel.clone(),
        INTERVAL,
    ));

    tokio::time::sleep(INTERVAL * 3).await;

    // A broken data channel means the link is gone: no retries, loop over.
    assert!(pump.is_finished());
    assert!(channel.sent.lock().unwrap().is_empty());
}
