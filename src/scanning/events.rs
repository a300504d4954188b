// src/scanning/events.rs

//! Notifications raised by the scanning services.
//!
//! Three categories, each on its own tokio broadcast channel:
//! - `DevicesRefreshed`        → [`DeviceSnapshot`] (owned by the registry)
//! - `ScanRepetitionCompleted` → [`RepetitionReport`]
//! - `ScanningCompleted`       → [`ScanSummary`]
//!
//! Subscribers hold a [`Subscription`]; they receive events raised after they
//! subscribed and run on their own task, never inside the service's locks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use super::checksum::page_digest;
use crate::devices::{Device, DeviceError, DeviceId, ImageFormat};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Successful capture of one device in one repetition.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCapture {
    pub device_id: DeviceId,
    pub hardware_id: String,
    pub name: String,
    pub format: ImageFormat,
    #[serde(skip)]
    pub pages: Vec<Vec<u8>>,
    pub page_digests: Vec<u64>,
    pub bytes: u64,
}

impl DeviceCapture {
    pub fn new(device: &Device, format: ImageFormat, pages: Vec<Vec<u8>>) -> Self {
        let page_digests = pages.iter().map(|p| page_digest(p)).collect();
        let bytes = pages.iter().map(|p| p.len() as u64).sum();
        Self {
            device_id: device.id,
            hardware_id: device.hardware_id.clone(),
            name: device.name.clone(),
            format,
            pages,
            page_digests,
            bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceFailure {
    pub device_id: DeviceId,
    pub hardware_id: String,
    pub error: DeviceError,
}

/// Outcome of one tick's fan-out. Devices appear in completion order.
#[derive(Debug, Clone, Serialize)]
pub struct RepetitionReport {
    pub repetition: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub successes: Vec<DeviceCapture>,
    pub failures: Vec<DeviceFailure>,
}

impl RepetitionReport {
    pub fn attempted(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn success_for(&self, hardware_id: &str) -> Option<&DeviceCapture> {
        self.successes.iter().find(|c| c.hardware_id == hardware_id)
    }

    pub fn failure_for(&self, hardware_id: &str) -> Option<&DeviceFailure> {
        self.failures.iter().find(|f| f.hardware_id == hardware_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// Repetitions whose dispatch ran to completion.
    pub repetitions: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    /// Ended by `stop_scanning` rather than schedule exhaustion.
    pub stopped: bool,
}

/// Receiving end of one event category.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(rx: broadcast::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the publisher is gone. Events missed
    /// because this subscriber fell behind are skipped with a warning.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(RecvError::Lagged(n)) => log::warn!("subscriber lagged, {n} event(s) skipped"),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) => return Some(ev),
                Err(TryRecvError::Lagged(n)) => log::warn!("subscriber lagged, {n} event(s) skipped"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Everything already queued, oldest first, without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Stop receiving. Dropping the subscription has the same effect.
    pub fn unsubscribe(self) {}
}

/// Send halves of the service-owned categories.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    pub(crate) repetition_tx: broadcast::Sender<Arc<RepetitionReport>>,
    pub(crate) completed_tx: broadcast::Sender<ScanSummary>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (repetition_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (completed_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { repetition_tx, completed_tx }
    }

    pub(crate) fn repetition_completed(&self, report: RepetitionReport) {
        let _ = self.repetition_tx.send(Arc::new(report)); // ignore when nobody listens
    }

    pub(crate) fn scanning_completed(&self, summary: ScanSummary) {
        let _ = self.completed_tx.send(summary);
    }
}
