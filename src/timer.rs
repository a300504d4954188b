// src/timer.rs

//! Pausable, cancellable interval timer.
//!
//! The timer is pull-based: one consumer awaits [`IntervalTimer::next_event`]
//! in a loop while any number of holders of the same `Arc<IntervalTimer>`
//! call `stop` / `pause` / `resume`. Because the next deadline is computed
//! when a tick is handed out, a consumer that is slow to come back simply
//! delays the following tick instead of piling up missed ones: the interval
//! is a minimum spacing between ticks, never a deadline.
//!
//! Event sequence for `repetitions = N ≥ 1`:
//! `Tick(1)` after `delay`, `Tick(2..=N)` every `interval`, then exactly one
//! `Complete(N)`. `stop()` short-circuits to `Complete(ticks so far)`.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::{self, Instant};

use crate::error::ScanError;

/// Immutable schedule handed to [`IntervalTimer::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerConfig {
    /// Wait before the first tick.
    pub delay: Duration,
    /// Minimum spacing between consecutive ticks.
    pub interval: Duration,
    /// `0` runs until stopped; `N` stops after `N` ticks.
    pub repetitions: u32,
}

impl TimerConfig {
    /// Unbounded schedule.
    pub fn new(delay: Duration, interval: Duration) -> Self {
        Self { delay, interval, repetitions: 0 }
    }

    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.repetitions == 0
    }
}

/// Notifications produced by the timer, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// 1-based index of the tick.
    Tick(u32),
    /// Number of ticks fired before the timer went idle.
    Complete(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running { deadline: Instant },
    Paused { remaining: Duration },
    /// Stopped or exhausted; `Complete` not yet handed out.
    Completing,
}

#[derive(Debug)]
struct TimerState {
    config: TimerConfig,
    phase: Phase,
    count: u32,
    start_time: Option<DateTime<Utc>>,
    finish_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct IntervalTimer {
    state: Mutex<TimerState>,
    wake: Notify,
}

impl Default for IntervalTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalTimer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState {
                config: TimerConfig::default(),
                phase: Phase::Idle,
                count: 0,
                start_time: None,
                finish_time: None,
            }),
            wake: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the timer. Fails while a previous run is still armed, including
    /// the window between `stop()` and the consumer receiving `Complete`.
    pub fn start(&self, config: TimerConfig) -> Result<(), ScanError> {
        {
            let mut st = self.lock();
            if st.phase != Phase::Idle {
                return Err(ScanError::invalid_state("timer is already running"));
            }
            st.config = config;
            st.count = 0;
            st.start_time = Some(Utc::now());
            st.finish_time = None;
            st.phase = Phase::Running { deadline: Instant::now() + config.delay };
        }
        log::debug!(
            "timer armed: delay={:?} interval={:?} repetitions={}",
            config.delay,
            config.interval,
            config.repetitions
        );
        self.wake.notify_one();
        Ok(())
    }

    /// Cancels any pending tick. Idempotent.
    pub fn stop(&self) {
        let stopped = {
            let mut st = self.lock();
            match st.phase {
                Phase::Running { .. } | Phase::Paused { .. } => {
                    st.phase = Phase::Completing;
                    true
                }
                Phase::Idle | Phase::Completing => false,
            }
        };
        if stopped {
            log::debug!("timer stop requested");
            self.wake.notify_one();
        }
    }

    /// Suspends the countdown, keeping the time already elapsed toward the
    /// next tick. Returns `false` if the timer was not running.
    pub fn pause(&self) -> bool {
        let paused = {
            let mut st = self.lock();
            match st.phase {
                Phase::Running { deadline } => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    st.phase = Phase::Paused { remaining };
                    true
                }
                _ => false,
            }
        };
        if paused {
            self.wake.notify_one();
        }
        paused
    }

    /// Resumes a paused countdown. Returns `false` if the timer was not paused.
    pub fn resume(&self) -> bool {
        let resumed = {
            let mut st = self.lock();
            match st.phase {
                Phase::Paused { remaining } => {
                    st.phase = Phase::Running { deadline: Instant::now() + remaining };
                    true
                }
                _ => false,
            }
        };
        if resumed {
            self.wake.notify_one();
        }
        resumed
    }

    /// Waits for the next tick or completion. Returns `None` once the timer is
    /// idle. Only one task should consume events.
    pub async fn next_event(&self) -> Option<TimerEvent> {
        loop {
            let wait_until = {
                let mut st = self.lock();
                match st.phase {
                    Phase::Idle => return None,
                    Phase::Completing => {
                        st.phase = Phase::Idle;
                        st.finish_time = Some(Utc::now());
                        return Some(TimerEvent::Complete(st.count));
                    }
                    Phase::Paused { .. } => None,
                    Phase::Running { deadline } => {
                        let now = Instant::now();
                        if now >= deadline {
                            st.count += 1;
                            let n = st.count;
                            let limit = st.config.repetitions;
                            st.phase = if limit != 0 && n >= limit {
                                Phase::Completing
                            } else {
                                Phase::Running { deadline: now + st.config.interval }
                            };
                            return Some(TimerEvent::Tick(n));
                        }
                        Some(deadline)
                    }
                }
            };

            match wait_until {
                Some(deadline) => {
                    tokio::select! {
                        _ = time::sleep_until(deadline) => {}
                        _ = self.wake.notified() => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.lock().start_time
    }

    pub fn finish_time(&self) -> Option<DateTime<Utc>> {
        self.lock().finish_time
    }

    pub fn delay(&self) -> Duration {
        self.lock().config.delay
    }

    pub fn interval(&self) -> Duration {
        self.lock().config.interval
    }

    pub fn repetitions(&self) -> u32 {
        self.lock().config.repetitions
    }

    /// Ticks fired so far in the current (or last) run.
    pub fn repetitions_count(&self) -> u32 {
        self.lock().count
    }

    /// Armed: running or paused.
    pub fn is_enabled(&self) -> bool {
        matches!(self.lock().phase, Phase::Running { .. } | Phase::Paused { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.lock().phase, Phase::Paused { .. })
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if matches!(st.phase, Phase::Running { .. } | Phase::Paused { .. }) {
            st.phase = Phase::Idle;
            st.finish_time = Some(Utc::now());
        }
    }
}
