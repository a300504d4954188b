//! Integration tests for the interval timer.
//!
//! All tests run on a paused tokio clock, so sleeps complete instantly and
//! tick instants can be compared against the schedule.
//!
//! Key responsibilities:
//! - N ticks followed by exactly one Complete(N).
//! - Stop from inside the tick loop and while settling.
//! - Pause / resume keep elapsed progress; instantaneous pause is a no-op.
//! - Interval is a minimum spacing when the consumer is slow.

use std::sync::Arc;
use std::time::Duration;

use scan_agent::{IntervalTimer, ScanError, TimerConfig, TimerEvent};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

const TOLERANCE: Duration = Duration::from_millis(5);

fn assert_close(actual: Duration, expected: Duration) {
    let diff = if actual > expected { actual - expected } else { expected - actual };
    assert!(diff <= TOLERANCE, "expected ~{:?}, got {:?}", expected, actual);
}

/// Drain the timer until it goes idle, recording each event's offset from `t0`.
async fn drain(timer: &IntervalTimer, t0: Instant) -> Vec<(TimerEvent, Duration)> {
    let mut out = Vec::new();
    while let Some(ev) = timer.next_event().await {
        out.push((ev, t0.elapsed()));
    }
    out
}

#[tokio::test(start_paused = true)]
async fn fires_n_ticks_then_one_complete() {
    let timer = IntervalTimer::new();
    let t0 = Instant::now();
    timer
        .start(TimerConfig::new(Duration::from_secs(2), Duration::from_secs(1)).with_repetitions(3))
        .unwrap();
    assert!(timer.is_enabled());
    assert!(timer.start_time().is_some());
    assert!(timer.finish_time().is_none());

    let events = drain(&timer, t0).await;
    let kinds: Vec<TimerEvent> = events.iter().map(|(e, _)| *e).collect();
    assert_eq!(
        kinds,
        vec![TimerEvent::Tick(1), TimerEvent::Tick(2), TimerEvent::Tick(3), TimerEvent::Complete(3)]
    );
    assert_close(events[0].1, Duration::from_secs(2));
    assert_close(events[1].1, Duration::from_secs(3));
    assert_close(events[2].1, Duration::from_secs(4));

    assert_eq!(timer.next_event().await, None);
    assert_eq!(timer.repetitions_count(), 3);
    assert!(!timer.is_enabled());
    assert!(timer.finish_time().is_some());
}

#[tokio::test(start_paused = true)]
async fn exposes_configured_schedule() {
    let timer = IntervalTimer::new();
    timer
        .start(TimerConfig::new(Duration::from_millis(250), Duration::from_secs(7)).with_repetitions(9))
        .unwrap();
    assert_eq!(timer.delay(), Duration::from_millis(250));
    assert_eq!(timer.interval(), Duration::from_secs(7));
    assert_eq!(timer.repetitions(), 9);
    assert_eq!(timer.repetitions_count(), 0);
    timer.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_inside_tick_ends_with_observed_count() {
    let timer = IntervalTimer::new();
    timer
        .start(TimerConfig::new(Duration::ZERO, Duration::from_secs(1)).with_repetitions(10))
        .unwrap();

    let mut seen = Vec::new();
    while let Some(ev) = timer.next_event().await {
        seen.push(ev);
        if ev == TimerEvent::Tick(2) {
            timer.stop();
            timer.stop(); // idempotent
        }
    }
    assert_eq!(seen, vec![TimerEvent::Tick(1), TimerEvent::Tick(2), TimerEvent::Complete(2)]);
}

#[tokio::test(start_paused = true)]
async fn unbounded_runs_until_stopped() {
    let timer = Arc::new(IntervalTimer::new());
    timer
        .start(TimerConfig::new(Duration::ZERO, Duration::from_millis(500)))
        .unwrap();

    let stopper = Arc::clone(&timer);
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(2_250)).await;
        stopper.stop();
    });

    let events = drain(&timer, Instant::now()).await;
    // ticks at 0, 0.5, 1.0, 1.5, 2.0 s
    assert_eq!(events.len(), 6);
    assert_eq!(events.last().map(|(e, _)| *e), Some(TimerEvent::Complete(5)));
}

#[tokio::test(start_paused = true)]
async fn start_is_rejected_while_armed_or_settling() {
    let timer = IntervalTimer::new();
    let cfg = TimerConfig::new(Duration::ZERO, Duration::from_secs(1)).with_repetitions(2);
    timer.start(cfg).unwrap();

    assert!(matches!(timer.start(cfg), Err(ScanError::InvalidState(_))));

    timer.stop();
    // Complete not yet consumed: the previous run is still settling.
    assert!(matches!(timer.start(cfg), Err(ScanError::InvalidState(_))));

    assert_eq!(timer.next_event().await, Some(TimerEvent::Complete(0)));
    timer.start(cfg).unwrap();
    assert_eq!(timer.next_event().await, Some(TimerEvent::Tick(1)));
    timer.stop();
}

#[tokio::test(start_paused = true)]
async fn instantaneous_pause_resume_changes_nothing() {
    let timer = IntervalTimer::new();
    let t0 = Instant::now();
    timer
        .start(TimerConfig::new(Duration::from_secs(1), Duration::from_secs(2)).with_repetitions(3))
        .unwrap();
    assert!(timer.pause());
    assert!(timer.is_paused());
    assert!(timer.resume());
    assert!(!timer.is_paused());

    let mut offsets = Vec::new();
    while let Some(ev) = timer.next_event().await {
        if let TimerEvent::Tick(_) = ev {
            offsets.push(t0.elapsed());
            timer.pause();
            timer.resume();
        }
    }
    assert_eq!(offsets.len(), 3);
    assert_close(offsets[0], Duration::from_secs(1));
    assert_close(offsets[1], Duration::from_secs(3));
    assert_close(offsets[2], Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn pause_keeps_elapsed_progress() {
    let timer = Arc::new(IntervalTimer::new());
    let t0 = Instant::now();
    timer
        .start(TimerConfig::new(Duration::ZERO, Duration::from_secs(10)).with_repetitions(2))
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let consumer = Arc::clone(&timer);
    tokio::spawn(async move {
        while let Some(ev) = consumer.next_event().await {
            let _ = tx.send((ev, t0.elapsed()));
        }
    });

    let (first, _) = rx.recv().await.unwrap();
    assert_eq!(first, TimerEvent::Tick(1));

    time::sleep(Duration::from_secs(4)).await;
    assert!(timer.pause());
    assert!(!timer.pause(), "second pause is a no-op");
    time::sleep(Duration::from_secs(100)).await;
    assert!(rx.try_recv().is_err(), "no tick while paused");
    assert!(timer.resume());

    let (second, at) = rx.recv().await.unwrap();
    assert_eq!(second, TimerEvent::Tick(2));
    // 4 s before the pause + 100 s paused + 6 s remaining
    assert_close(at, Duration::from_secs(110));
    assert_eq!(rx.recv().await.unwrap().0, TimerEvent::Complete(2));
}

#[tokio::test(start_paused = true)]
async fn slow_consumer_delays_instead_of_bursting() {
    let timer = IntervalTimer::new();
    let t0 = Instant::now();
    timer
        .start(TimerConfig::new(Duration::ZERO, Duration::from_secs(1)).with_repetitions(3))
        .unwrap();

    let mut offsets = Vec::new();
    while let Some(ev) = timer.next_event().await {
        if let TimerEvent::Tick(_) = ev {
            offsets.push(t0.elapsed());
            // Handling takes longer than the interval.
            time::sleep(Duration::from_secs(3)).await;
        }
    }
    assert_close(offsets[0], Duration::ZERO);
    assert_close(offsets[1], Duration::from_secs(3));
    assert_close(offsets[2], Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn idle_timer_has_no_events() {
    let timer = IntervalTimer::new();
    assert_eq!(timer.next_event().await, None);
    assert!(!timer.pause());
    assert!(!timer.resume());
    timer.stop();
    assert!(!timer.is_enabled());
}
