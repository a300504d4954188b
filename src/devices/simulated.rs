// src/devices/simulated.rs

//! In-process stand-in for real scanner hardware.
//!
//! Devices are declared in `[[simulator.devices]]` (or built in code) and can
//! be attached, detached, disconnected, slowed down or told to fault on given
//! capture attempts. Used by the console runner and by the test suites.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::format::{ImageFormat, NativeFormat};
use super::interop::{DeviceDescriptor, DeviceInterop, InteropError, NativeCapabilities};
use super::model::ColorMode;
use crate::config::model::ImagingParameters;

fn yes() -> bool { true }
fn one_page() -> u32 { 1 }
fn default_page_bytes() -> usize { 4096 }

/// Mirror of one `[[simulator.devices]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatedDeviceConfig {
    pub hardware_id: String,
    pub name: String,
    #[serde(default = "yes")]
    pub connected: bool,
    #[serde(default = "one_page")]
    pub pages: u32,
    #[serde(default = "default_page_bytes")]
    pub page_bytes: usize,
    #[serde(default)]
    pub latency_ms: u64,
    /// 1-based capture attempts that fail while connected.
    #[serde(default)]
    pub fail_on_captures: Vec<u32>,
    #[serde(default)]
    pub resolutions: Vec<u32>,
    #[serde(default)]
    pub formats: Vec<ImageFormat>,
    #[serde(default)]
    pub color_modes: Vec<ColorMode>,
    #[serde(default)]
    pub duplex: bool,
    #[serde(default)]
    pub feeder: bool,
    #[serde(default = "yes")]
    pub flatbed: bool,
}

impl SimulatedDeviceConfig {
    pub fn new(hardware_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            name: name.into(),
            connected: true,
            pages: one_page(),
            page_bytes: default_page_bytes(),
            latency_ms: 0,
            fail_on_captures: Vec::new(),
            resolutions: Vec::new(),
            formats: Vec::new(),
            color_modes: Vec::new(),
            duplex: false,
            feeder: false,
            flatbed: true,
        }
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn with_pages(mut self, pages: u32, page_bytes: usize) -> Self {
        self.pages = pages;
        self.page_bytes = page_bytes;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn failing_on(mut self, attempts: &[u32]) -> Self {
        self.fail_on_captures = attempts.to_vec();
        self
    }

    pub fn with_resolutions(mut self, resolutions: &[u32]) -> Self {
        self.resolutions = resolutions.to_vec();
        self
    }

    pub fn with_formats(mut self, formats: &[ImageFormat]) -> Self {
        self.formats = formats.to_vec();
        self
    }
}

#[derive(Debug)]
struct SimState {
    devices: Vec<SimulatedDeviceConfig>,
    attempts: HashMap<String, u32>,
}

#[derive(Debug)]
pub struct SimulatedInterop {
    state: Mutex<SimState>,
    available: AtomicBool,
    supported: Vec<NativeFormat>,
}

impl SimulatedInterop {
    pub fn new(devices: Vec<SimulatedDeviceConfig>) -> Self {
        Self {
            state: Mutex::new(SimState { devices, attempts: HashMap::new() }),
            available: AtomicBool::new(true),
            supported: ImageFormat::ALL.iter().map(|f| f.native()).collect(),
        }
    }

    /// Restrict the formats the layer claims to transfer.
    pub fn with_supported_formats(mut self, formats: &[ImageFormat]) -> Self {
        self.supported = formats.iter().map(|f| f.native()).collect();
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug a device in (replaces an entry with the same hardware id).
    pub fn attach(&self, device: SimulatedDeviceConfig) {
        let mut st = self.lock();
        st.devices.retain(|d| d.hardware_id != device.hardware_id);
        st.devices.push(device);
    }

    /// Unplug: the device disappears from enumeration.
    pub fn detach(&self, hardware_id: &str) {
        self.lock().devices.retain(|d| d.hardware_id != hardware_id);
    }

    /// Keep the device enumerated but flip its connection flag.
    pub fn set_connected(&self, hardware_id: &str, connected: bool) {
        if let Some(d) = self.lock().devices.iter_mut().find(|d| d.hardware_id == hardware_id) {
            d.connected = connected;
        }
    }

    /// Simulate the whole interop layer going away.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Capture attempts that reached this layer for `hardware_id`.
    pub fn capture_attempts(&self, hardware_id: &str) -> u32 {
        self.lock().attempts.get(hardware_id).copied().unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), InteropError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(InteropError::Unavailable("simulator switched off".into()))
        }
    }

    fn is_connected(&self, hardware_id: &str) -> bool {
        self.lock()
            .devices
            .iter()
            .any(|d| d.hardware_id == hardware_id && d.connected)
    }
}

#[async_trait]
impl DeviceInterop for SimulatedInterop {
    fn name(&self) -> &'static str {
        "simulator"
    }

    fn supported_formats(&self) -> Vec<NativeFormat> {
        self.supported.clone()
    }

    async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, InteropError> {
        self.check_available()?;
        Ok(self
            .lock()
            .devices
            .iter()
            .map(|d| DeviceDescriptor {
                hardware_id: d.hardware_id.clone(),
                name: d.name.clone(),
                connected: d.connected,
            })
            .collect())
    }

    async fn describe(&self, hardware_id: &str) -> Result<NativeCapabilities, InteropError> {
        self.check_available()?;
        let st = self.lock();
        let d = st
            .devices
            .iter()
            .find(|d| d.hardware_id == hardware_id)
            .ok_or_else(|| InteropError::NotConnected(hardware_id.to_owned()))?;
        Ok(NativeCapabilities {
            resolutions: d.resolutions.clone(),
            formats: d.formats.iter().map(|f| f.native()).collect(),
            color_modes: d.color_modes.clone(),
            duplex: d.duplex,
            feeder: d.feeder,
            flatbed: d.flatbed,
        })
    }

    async fn capture(
        &self,
        hardware_id: &str,
        params: &ImagingParameters,
        format: NativeFormat,
    ) -> Result<Vec<Vec<u8>>, InteropError> {
        self.check_available()?;
        let (attempt, device) = {
            let mut st = self.lock();
            let device = st
                .devices
                .iter()
                .find(|d| d.hardware_id == hardware_id)
                .cloned()
                .ok_or_else(|| InteropError::NotConnected(hardware_id.to_owned()))?;
            let attempt = st.attempts.entry(hardware_id.to_owned()).or_insert(0);
            *attempt += 1;
            (*attempt, device)
        };

        if !device.connected {
            return Err(InteropError::NotConnected(hardware_id.to_owned()));
        }

        if device.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(device.latency_ms)).await;
        }

        // Unplugged while the capture was running.
        if !self.is_connected(hardware_id) {
            return Err(InteropError::NotConnected(hardware_id.to_owned()));
        }
        if device.fail_on_captures.contains(&attempt) {
            return Err(InteropError::Failed(format!("paper jam on capture {}", attempt)));
        }

        Ok((0..device.pages)
            .map(|page| synth_page(hardware_id, attempt, page, params, format, device.page_bytes))
            .collect())
    }
}

/// Header line followed by filler up to `size` bytes.
fn synth_page(
    hardware_id: &str,
    attempt: u32,
    page: u32,
    params: &ImagingParameters,
    format: NativeFormat,
    size: usize,
) -> Vec<u8> {
    let header = format!(
        "SIM {} {} capture={} page={} dpi={}\n",
        format, hardware_id, attempt, page, params.resolution_dpi
    );
    let mut buf = header.into_bytes();
    let fill = (attempt as u8).wrapping_mul(31).wrapping_add(page as u8);
    if buf.len() < size {
        buf.resize(size, fill);
    }
    buf
}
