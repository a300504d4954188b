// src/devices/interop.rs

//! The device-interop seam.
//! -----------------------------------------------------------------------------
//! Everything that actually talks to scanner hardware sits behind
//! [`DeviceInterop`]. The registry only ever calls these four operations and
//! relies on the error kind to tell "not connected" apart from "failed while
//! connected". Driver plumbing (WIA, SANE, TWAIN…) lives in implementors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::format::NativeFormat;
use super::model::ColorMode;
use crate::config::model::ImagingParameters;

/// What enumeration reports for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub hardware_id: String,
    pub name: String,
    pub connected: bool,
}

/// Capability descriptor in interop terms (native format ids).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeCapabilities {
    pub resolutions: Vec<u32>,
    pub formats: Vec<NativeFormat>,
    pub color_modes: Vec<ColorMode>,
    pub duplex: bool,
    pub feeder: bool,
    pub flatbed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteropError {
    #[error("device '{0}' is not connected")]
    NotConnected(String),

    #[error("device operation failed: {0}")]
    Failed(String),

    #[error("interop layer unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DeviceInterop: Send + Sync + 'static {
    /// Display name for logs.
    fn name(&self) -> &'static str;

    /// Native formats the layer can transfer. Checked against the configured
    /// output format before a run starts.
    fn supported_formats(&self) -> Vec<NativeFormat>;

    async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, InteropError>;

    async fn describe(&self, hardware_id: &str) -> Result<NativeCapabilities, InteropError>;

    /// One capture; one buffer per page / frame.
    async fn capture(
        &self,
        hardware_id: &str,
        params: &ImagingParameters,
        format: NativeFormat,
    ) -> Result<Vec<Vec<u8>>, InteropError>;
}
