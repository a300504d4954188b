// src/scanning/progress.rs

//! Incremental per-device progress, pushed as each device finishes within a
//! tick. Delivery is fire-and-forget: a sink must never block the tick.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::devices::DeviceId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub repetition: u32,
    pub device_id: DeviceId,
    pub hardware_id: String,
    /// Running totals for this device over the current run.
    pub pages_captured: u64,
    pub bytes_captured: u64,
    /// The device's capture failed in this repetition.
    pub failed: bool,
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

/// Forwards updates into a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::Sender<ProgressUpdate>,
}

impl ChannelProgressSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_progress(&self, update: ProgressUpdate) {
        if self.tx.try_send(update).is_err() {
            log::trace!("progress update dropped (sink full or closed)");
        }
    }
}
