// src/error.rs

//! Errors surfaced synchronously to callers of the timer and the scanning
//! services. Per-device capture failures live in [`crate::devices::DeviceError`]
//! and only reach callers through the tick reports.

use thiserror::Error;

use crate::devices::DeviceError;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Operation attempted in the wrong run state (e.g. start while running).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Scanning configuration rejected before any dispatch.
    #[error("invalid scanning configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl ScanError {
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        ScanError::InvalidState(msg.into())
    }

    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        ScanError::InvalidConfig(msg.into())
    }
}
