// src/devices/model.rs

//! Device identity, capabilities and registry snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::format::ImageFormat;
use super::interop::NativeCapabilities;

/// Process-local identifier, unique inside one registry and stable for as
/// long as the registry has seen the device's hardware id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Color,
    Grayscale,
    BlackWhite,
}

/// What a device can do. Empty lists mean "not reported", which the
/// registry treats as "anything goes" and leaves to the interop to reject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub resolutions: Vec<u32>,
    pub formats: Vec<ImageFormat>,
    pub color_modes: Vec<ColorMode>,
    pub duplex: bool,
    pub feeder: bool,
    pub flatbed: bool,
}

impl Capabilities {
    /// Translate an interop descriptor; native formats without a mapping are dropped.
    pub fn from_native(native: &NativeCapabilities) -> Self {
        let formats = native
            .formats
            .iter()
            .filter_map(|nf| {
                let mapped = ImageFormat::from_native(*nf);
                if mapped.is_none() {
                    log::debug!("ignoring unmapped native format {}", nf);
                }
                mapped
            })
            .collect();

        Self {
            resolutions: native.resolutions.clone(),
            formats,
            color_modes: native.color_modes.clone(),
            duplex: native.duplex,
            feeder: native.feeder,
            flatbed: native.flatbed,
        }
    }

    pub fn supports_resolution(&self, dpi: u32) -> bool {
        self.resolutions.is_empty() || self.resolutions.contains(&dpi)
    }

    pub fn supports_format(&self, format: ImageFormat) -> bool {
        self.formats.is_empty() || self.formats.contains(&format)
    }

    pub fn supports_color_mode(&self, mode: ColorMode) -> bool {
        self.color_modes.is_empty() || self.color_modes.contains(&mode)
    }
}

/// One physical imaging device as last seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: DeviceId,
    /// Hardware-sourced identifier, stable across process restarts.
    pub hardware_id: String,
    pub name: String,
    pub connected: bool,
    /// May be used when connected. Never forwarded to hardware.
    pub enabled: bool,
    pub capabilities: Capabilities,
}

impl Device {
    /// Eligible for the next dispatch.
    pub fn is_dispatchable(&self) -> bool {
        self.connected && self.enabled
    }
}

/// Payload of a `DevicesRefreshed` notification.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub devices: Vec<Device>,
    pub refreshed_at: DateTime<Utc>,
    /// `false` when enumeration failed and the set was emptied.
    pub interop_available: bool,
}
