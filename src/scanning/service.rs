// src/scanning/service.rs

//! Scanning service: turns timer ticks into per-device capture fan-out.
//!
//! One driver task per run consumes the timer. For every `Tick` it
//! 1. snapshots the enabled + connected devices,
//! 2. spawns one capture task per device with the current config `Arc`,
//! 3. joins them in completion order, pushing progress as each one lands,
//! 4. publishes a `RepetitionReport`.
//!
//! The driver only asks the timer for the next event after the fan-out is
//! joined, so ticks never overlap. On `Complete` it publishes the summary and
//! the run is over.
//!
//! Every run gets a generation number. When a run ends, its generation is
//! published on a `watch` channel, and `stop_scanning(true)` waits for that.
//! This holds however many callers are waiting, and also when the stop lands
//! while `start_scanning` is still refreshing the registry.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use log::Level;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::watch;

use super::events::{
    DeviceCapture, DeviceFailure, EventBus, RepetitionReport, ScanSummary, Subscription,
};
use super::progress::{ProgressSink, ProgressUpdate};
use crate::config::ScanningConfig;
use crate::devices::{Device, DeviceError, DeviceId, DeviceRegistry, DeviceSnapshot};
use crate::error::ScanError;
use crate::scan_log;
use crate::timer::{IntervalTimer, TimerConfig, TimerEvent};

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    stop_requested: bool,
    completed: u32,
    /// Bumped by every `start_scanning` that gets past the running check.
    generation: u64,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    /// Running (pages, bytes) per device for progress updates.
    totals: HashMap<DeviceId, (u64, u64)>,
}

struct ServiceInner {
    registry: Arc<DeviceRegistry>,
    timer: IntervalTimer,
    config: RwLock<Arc<ScanningConfig>>,
    run: Mutex<RunState>,
    /// Generation of the last run that ended.
    finished_tx: watch::Sender<u64>,
    events: EventBus,
    refresh_between_ticks: bool,
}

pub struct ScanningService {
    inner: Arc<ServiceInner>,
}

impl ScanningService {
    /// Validates `config` against the registry's interop and applies its
    /// device policy.
    pub fn new(registry: Arc<DeviceRegistry>, config: ScanningConfig) -> Result<Self, ScanError> {
        Self::build(registry, config, false)
    }

    pub(crate) fn build(
        registry: Arc<DeviceRegistry>,
        config: ScanningConfig,
        refresh_between_ticks: bool,
    ) -> Result<Self, ScanError> {
        check_config(&registry, &config)?;
        registry.apply_policy(&config.devices);
        Ok(Self {
            inner: Arc::new(ServiceInner {
                registry,
                timer: IntervalTimer::new(),
                config: RwLock::new(Arc::new(config)),
                run: Mutex::new(RunState::default()),
                finished_tx: watch::Sender::new(0),
                events: EventBus::new(),
                refresh_between_ticks,
            }),
        })
    }

    /// Refreshes the registry, arms the timer and returns; ticks are handled
    /// on a background task. Must be called inside a tokio runtime.
    pub async fn start_scanning(
        &self,
        schedule: TimerConfig,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<(), ScanError> {
        let inner = &self.inner;
        let generation = {
            let mut run = inner.lock_run();
            if run.running {
                return Err(ScanError::invalid_state("a scan is already running"));
            }
            run.running = true;
            run.stop_requested = false;
            run.generation += 1;
            run.generation
        };
        // Ends the run on every early return, and if this future is dropped.
        let run = RunGuard { inner: Arc::clone(inner), generation };

        let config = inner.current_config();
        check_config(&inner.registry, &config)?;

        inner.registry.refresh().await;

        inner.timer.start(schedule)?;
        let stop_early = {
            let mut state = inner.lock_run();
            state.completed = 0;
            state.started_at = Some(Utc::now());
            state.finished_at = None;
            state.totals.clear();
            state.stop_requested
        };
        if stop_early {
            inner.timer.stop();
        }

        scan_log!(
            Level::Info,
            "service",
            "scanning started: delay={:?} interval={:?} repetitions={}",
            schedule.delay,
            schedule.interval,
            schedule.repetitions
        );
        tokio::spawn(drive(run, progress));
        Ok(())
    }

    /// Stops the schedule. With `wait_for_completion` the call returns once
    /// the in-flight tick (if any) has finished and `ScanningCompleted` has
    /// been published; otherwise it returns at once. No-op when idle.
    /// Any number of callers may wait on the same run.
    pub async fn stop_scanning(&self, wait_for_completion: bool) {
        let inner = &self.inner;
        let generation = {
            let mut run = inner.lock_run();
            if !run.running {
                return;
            }
            run.stop_requested = true;
            run.generation
        };
        inner.timer.stop();
        scan_log!(Level::Info, "service", "stop requested (wait={})", wait_for_completion);

        if !wait_for_completion {
            return;
        }
        let mut finished = inner.finished_tx.subscribe();
        if finished.wait_for(|done| *done >= generation).await.is_err() {
            scan_log!(Level::Error, "service", "run {} ended without signalling", generation);
        }
    }

    /// Replaces the configuration for dispatches started from now on.
    pub fn update_config(&self, config: ScanningConfig) -> Result<(), ScanError> {
        check_config(&self.inner.registry, &config)?;
        self.inner.registry.apply_policy(&config.devices);
        *self.inner.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        log::debug!("scanning configuration updated");
        Ok(())
    }

    pub fn config(&self) -> Arc<ScanningConfig> {
        self.inner.current_config()
    }

    /// Current device snapshot.
    pub fn scanners(&self) -> Vec<Device> {
        self.inner.registry.devices()
    }

    pub fn is_scan_running(&self) -> bool {
        self.inner.lock_run().running
    }

    /// Repetitions fully dispatched in the current (or last) run.
    pub fn scan_repetitions_count(&self) -> u32 {
        self.inner.lock_run().completed
    }

    /// When the underlying timer was last armed.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.inner.timer.start_time()
    }

    /// When the underlying timer last completed.
    pub fn finish_time(&self) -> Option<DateTime<Utc>> {
        self.inner.timer.finish_time()
    }

    pub(crate) fn run_started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_run().started_at
    }

    pub(crate) fn run_finished_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_run().finished_at
    }

    /// Suspend the schedule between ticks. A tick already dispatched runs on.
    pub fn pause(&self) -> bool {
        self.inner.timer.pause()
    }

    pub fn resume(&self) -> bool {
        self.inner.timer.resume()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.timer.is_paused()
    }

    pub fn subscribe_devices_refreshed(&self) -> Subscription<DeviceSnapshot> {
        Subscription::new(self.inner.registry.subscribe())
    }

    pub fn subscribe_repetition_completed(&self) -> Subscription<Arc<RepetitionReport>> {
        Subscription::new(self.inner.events.repetition_tx.subscribe())
    }

    pub fn subscribe_scanning_completed(&self) -> Subscription<ScanSummary> {
        Subscription::new(self.inner.events.completed_tx.subscribe())
    }
}

impl Drop for ScanningService {
    fn drop(&mut self) {
        // The driver holds its own Arc; without this it would outlive us.
        {
            let mut run = self.inner.lock_run();
            if run.running {
                run.stop_requested = true;
            }
        }
        self.inner.timer.stop();
    }
}

fn check_config(registry: &DeviceRegistry, config: &ScanningConfig) -> Result<(), ScanError> {
    config
        .validate()
        .map_err(|e| ScanError::invalid_config(e.to_string()))?;
    let format = config.output.format;
    if !registry.supports_format(format) {
        return Err(ScanError::invalid_config(format!(
            "output format {} is not supported by {}",
            format,
            registry.interop_name()
        )));
    }
    Ok(())
}

impl ServiceInner {
    fn lock_run(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks run `generation` as over and releases its stop waiters.
    fn finish_run(&self, generation: u64) {
        self.lock_run().running = false;
        self.finished_tx.send_replace(generation);
    }

    fn current_config(&self) -> Arc<ScanningConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// One tick's fan-out. Captures are independent tasks; a fault or panic in
    /// one is recorded against that device only.
    async fn dispatch(
        &self,
        repetition: u32,
        progress: Option<&dyn ProgressSink>,
    ) -> RepetitionReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let config = self.current_config();
        let format = config.output.format;
        let devices = self.registry.dispatchable();
        scan_log!(
            Level::Debug,
            "service",
            "repetition {} dispatching to {} device(s)",
            repetition,
            devices.len()
        );

        let mut pending: FuturesUnordered<_> = devices
            .into_iter()
            .map(|device| {
                let registry = Arc::clone(&self.registry);
                let config = Arc::clone(&config);
                let target = device.clone();
                let handle = tokio::spawn(async move {
                    registry
                        .capture(&target, &config.imaging, config.output.format)
                        .await
                });
                async move { (device, handle.await) }
            })
            .collect();

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        while let Some((device, joined)) = pending.next().await {
            let outcome = joined.unwrap_or_else(|e| {
                Err(DeviceError::Fault {
                    hardware_id: device.hardware_id.clone(),
                    reason: format!("capture task failed: {}", e),
                })
            });
            match outcome {
                Ok(pages) => {
                    let capture = DeviceCapture::new(&device, format, pages);
                    metrics::counter!("scan_captures_total", "outcome" => "success").increment(1);
                    self.report_progress(repetition, &device, Some(&capture), progress);
                    successes.push(capture);
                }
                Err(error) => {
                    scan_log!(
                        Level::Warn,
                        "service",
                        "repetition {}: {} ({}) failed: {}",
                        repetition,
                        device.id,
                        device.name,
                        error
                    );
                    metrics::counter!("scan_captures_total", "outcome" => "failure").increment(1);
                    self.report_progress(repetition, &device, None, progress);
                    failures.push(DeviceFailure {
                        device_id: device.id,
                        hardware_id: device.hardware_id.clone(),
                        error,
                    });
                }
            }
        }

        metrics::histogram!("scan_repetition_seconds").record(clock.elapsed().as_secs_f64());
        RepetitionReport {
            repetition,
            started_at,
            finished_at: Utc::now(),
            successes,
            failures,
        }
    }

    fn report_progress(
        &self,
        repetition: u32,
        device: &Device,
        capture: Option<&DeviceCapture>,
        sink: Option<&dyn ProgressSink>,
    ) {
        let Some(sink) = sink else { return };
        let (pages, bytes) = {
            let mut run = self.lock_run();
            let totals = run.totals.entry(device.id).or_default();
            if let Some(c) = capture {
                totals.0 += c.pages.len() as u64;
                totals.1 += c.bytes;
            }
            *totals
        };
        sink.on_progress(ProgressUpdate {
            repetition,
            device_id: device.id,
            hardware_id: device.hardware_id.clone(),
            pages_captured: pages,
            bytes_captured: bytes,
            failed: capture.is_none(),
        });
    }
}

/// Ownership of one run. Dropping it ends the run: `running` is cleared and
/// stop waiters are released, whether the driver returned, unwound, or never
/// got spawned.
struct RunGuard {
    inner: Arc<ServiceInner>,
    generation: u64,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.finish_run(self.generation);
    }
}

async fn drive(run: RunGuard, progress: Option<Arc<dyn ProgressSink>>) {
    let inner = Arc::clone(&run.inner);
    let mut ticks = 0;
    while let Some(event) = inner.timer.next_event().await {
        match event {
            TimerEvent::Tick(n) => {
                if inner.lock_run().stop_requested {
                    log::debug!("tick {} ignored, stop already requested", n);
                    continue;
                }
                if inner.refresh_between_ticks && n > 1 {
                    inner.registry.refresh().await;
                }

                let report = inner.dispatch(n, progress.as_deref()).await;
                inner.lock_run().completed += 1;
                scan_log!(
                    Level::Info,
                    "service",
                    "repetition {} done: {} ok, {} failed",
                    n,
                    report.successes.len(),
                    report.failures.len()
                );
                inner.events.repetition_completed(report);
            }
            TimerEvent::Complete(total) => {
                ticks = total;
                break;
            }
        }
    }

    // Run-only resources go before subscribers hear about completion.
    drop(progress);

    let summary = {
        let mut run = inner.lock_run();
        let finished_at = Utc::now();
        run.finished_at = Some(finished_at);
        ScanSummary {
            repetitions: run.completed,
            started_at: run.started_at,
            finished_at,
            stopped: run.stop_requested,
        }
    };
    scan_log!(
        Level::Info,
        "service",
        "scanning completed: {} repetition(s) dispatched, {} tick(s), stopped={}",
        summary.repetitions,
        ticks,
        summary.stopped
    );
    inner.events.scanning_completed(summary);
    drop(run);
}
