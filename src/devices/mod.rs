//! Imaging devices: model, format table, interop seam and the registry.

pub mod format;
pub mod interop;
pub mod model;
pub mod registry;
pub mod simulated;

use serde::Serialize;
use thiserror::Error;

pub use format::{ImageFormat, NativeFormat};
pub use interop::{DeviceDescriptor, DeviceInterop, InteropError, NativeCapabilities};
pub use model::{Capabilities, ColorMode, Device, DeviceId, DeviceSnapshot};
pub use registry::DeviceRegistry;
pub use simulated::{SimulatedDeviceConfig, SimulatedInterop};

/// Per-device failures. Recovered inside a tick; reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum DeviceError {
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    #[error("device '{hardware_id}' is not connected")]
    NotConnected { hardware_id: String },

    #[error("device '{hardware_id}' does not support {setting}")]
    Unsupported { hardware_id: String, setting: String },

    #[error("device '{hardware_id}' faulted: {reason}")]
    Fault { hardware_id: String, reason: String },

    #[error("device registry unavailable: {0}")]
    RegistryUnavailable(String),
}
