// src/scanning/interval.rs

//! Interval-aware scanning: the schedule comes from an `IntervalTimerConfig`,
//! the device set is re-enumerated before every tick after the first, and
//! the run's own wall-clock bounds are exposed for reporting.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::events::{RepetitionReport, ScanSummary, Subscription};
use super::progress::ProgressSink;
use super::service::ScanningService;
use crate::config::{IntervalTimerConfig, ScanningConfig};
use crate::devices::{Device, DeviceRegistry, DeviceSnapshot};
use crate::error::ScanError;
use crate::timer::TimerConfig;

pub struct IntervalScanningService {
    service: ScanningService,
}

impl IntervalScanningService {
    pub fn new(registry: Arc<DeviceRegistry>, config: ScanningConfig) -> Result<Self, ScanError> {
        Ok(Self { service: ScanningService::build(registry, config, true)? })
    }

    pub async fn start_scanning(
        &self,
        schedule: &IntervalTimerConfig,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<(), ScanError> {
        let schedule =
            TimerConfig::try_from(schedule).map_err(|e| ScanError::invalid_config(e.to_string()))?;
        self.service.start_scanning(schedule, progress).await
    }

    /// Same as [`IntervalScanningService::start_scanning`] for an already parsed schedule.
    pub async fn start_with(
        &self,
        schedule: TimerConfig,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<(), ScanError> {
        self.service.start_scanning(schedule, progress).await
    }

    pub async fn stop_scanning(&self, wait_for_completion: bool) {
        self.service.stop_scanning(wait_for_completion).await
    }

    pub fn update_config(&self, config: ScanningConfig) -> Result<(), ScanError> {
        self.service.update_config(config)
    }

    /// Wall-clock start of the current (or last) run; set when it was scheduled.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.service.run_started_at()
    }

    /// Wall-clock end of the last run; `None` while running.
    pub fn finish_time(&self) -> Option<DateTime<Utc>> {
        self.service.run_finished_at()
    }

    pub fn scanners(&self) -> Vec<Device> {
        self.service.scanners()
    }

    pub fn is_scan_running(&self) -> bool {
        self.service.is_scan_running()
    }

    pub fn scan_repetitions_count(&self) -> u32 {
        self.service.scan_repetitions_count()
    }

    pub fn subscribe_devices_refreshed(&self) -> Subscription<DeviceSnapshot> {
        self.service.subscribe_devices_refreshed()
    }

    pub fn subscribe_repetition_completed(&self) -> Subscription<Arc<RepetitionReport>> {
        self.service.subscribe_repetition_completed()
    }

    pub fn subscribe_scanning_completed(&self) -> Subscription<ScanSummary> {
        self.service.subscribe_scanning_completed()
    }

    /// The underlying service, for timer-level state and pause / resume.
    pub fn service(&self) -> &ScanningService {
        &self.service
    }
}
