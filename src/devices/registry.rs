// src/devices/registry.rs

//! # Device Registry
//!
//! Bridges the interop layer to the scanning service.
//!
//! **Responsibilities:**
//! - Re-enumerate hardware and keep numeric ids stable per hardware id.
//! - Keep enablement in memory across refreshes.
//! - Gate captures: unknown / disconnected / unsupported never reach the interop.
//! - Broadcast a `DevicesRefreshed` snapshot after every refresh, even a failed one.

use futures::future::join_all;
use log::Level;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tokio::sync::broadcast;

use super::format::ImageFormat;
use super::interop::{DeviceDescriptor, DeviceInterop, InteropError};
use super::model::{Capabilities, Device, DeviceId, DeviceSnapshot};
use super::DeviceError;
use crate::config::model::{DevicePolicy, ImagingParameters};
use crate::scan_log;

const REFRESH_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
struct RegistryState {
    devices: Vec<Device>,
    /// Every hardware id ever observed → its numeric id.
    known_ids: HashMap<String, DeviceId>,
    /// Enablement by hardware id; outlives the device's presence.
    enablement: HashMap<String, bool>,
    enable_new_devices: bool,
    next_id: u32,
}

impl RegistryState {
    fn id_for(&mut self, hardware_id: &str) -> DeviceId {
        if let Some(id) = self.known_ids.get(hardware_id) {
            return *id;
        }
        self.next_id += 1;
        let id = DeviceId(self.next_id);
        self.known_ids.insert(hardware_id.to_owned(), id);
        id
    }
}

pub struct DeviceRegistry {
    interop: Arc<dyn DeviceInterop>,
    state: RwLock<RegistryState>,
    refreshed_tx: broadcast::Sender<DeviceSnapshot>,
}

impl DeviceRegistry {
    pub fn new(interop: Arc<dyn DeviceInterop>) -> Self {
        let (refreshed_tx, _) = broadcast::channel(REFRESH_CHANNEL_CAPACITY);
        Self {
            interop,
            state: RwLock::new(RegistryState {
                devices: Vec::new(),
                known_ids: HashMap::new(),
                enablement: HashMap::new(),
                enable_new_devices: true,
                next_id: 0,
            }),
            refreshed_tx,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interop_name(&self) -> &'static str {
        self.interop.name()
    }

    /// Re-enumerate connected devices. Never fails: an unavailable interop
    /// layer yields an empty set, and the snapshot is broadcast regardless.
    pub async fn refresh(&self) -> DeviceSnapshot {
        let (descriptors, interop_available) = match self.interop.enumerate().await {
            Ok(found) => (found, true),
            Err(e) => {
                scan_log!(Level::Warn, "registry", "enumeration via {} failed: {}", self.interop.name(), e);
                (Vec::new(), false)
            }
        };

        let mut seen = HashSet::new();
        let unique: Vec<DeviceDescriptor> = descriptors
            .into_iter()
            .filter(|d| {
                let fresh = seen.insert(d.hardware_id.clone());
                if !fresh {
                    scan_log!(Level::Warn, "registry", "duplicate hardware id '{}' ignored", d.hardware_id);
                }
                fresh
            })
            .collect();

        let capabilities = join_all(unique.iter().map(|d| self.describe(d))).await;

        let snapshot = {
            let mut guard = self.write();
            let st = &mut *guard;
            let default_enabled = st.enable_new_devices;
            let mut devices = Vec::with_capacity(unique.len());
            for (desc, caps) in unique.into_iter().zip(capabilities) {
                let id = st.id_for(&desc.hardware_id);
                let enabled = *st
                    .enablement
                    .entry(desc.hardware_id.clone())
                    .or_insert(default_enabled);
                devices.push(Device {
                    id,
                    hardware_id: desc.hardware_id,
                    name: desc.name,
                    connected: desc.connected,
                    enabled,
                    capabilities: caps,
                });
            }
            st.devices = devices;
            DeviceSnapshot {
                devices: st.devices.clone(),
                refreshed_at: Utc::now(),
                interop_available,
            }
        };

        scan_log!(
            Level::Info,
            "registry",
            "{} device(s) present, {} dispatchable",
            snapshot.devices.len(),
            snapshot.devices.iter().filter(|d| d.is_dispatchable()).count()
        );
        let _ = self.refreshed_tx.send(snapshot.clone()); // no subscribers is fine
        snapshot
    }

    async fn describe(&self, desc: &DeviceDescriptor) -> Capabilities {
        match self.interop.describe(&desc.hardware_id).await {
            Ok(native) => Capabilities::from_native(&native),
            Err(e) => {
                scan_log!(Level::Warn, "registry", "describe '{}' failed: {}", desc.hardware_id, e);
                Capabilities::default()
            }
        }
    }

    /// Current snapshot of the active set.
    pub fn devices(&self) -> Vec<Device> {
        self.read().devices.clone()
    }

    pub fn device(&self, id: DeviceId) -> Option<Device> {
        self.read().devices.iter().find(|d| d.id == id).cloned()
    }

    /// Enabled and connected devices, in enumeration order.
    pub fn dispatchable(&self) -> Vec<Device> {
        self.read()
            .devices
            .iter()
            .filter(|d| d.is_dispatchable())
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceSnapshot> {
        self.refreshed_tx.subscribe()
    }

    pub fn set_enabled(&self, id: DeviceId, enabled: bool) -> Result<(), DeviceError> {
        let hardware_id = self
            .read()
            .known_ids
            .iter()
            .find(|(_, known)| **known == id)
            .map(|(hw, _)| hw.clone())
            .ok_or(DeviceError::UnknownDevice(id))?;
        self.set_enabled_by_hardware_id(&hardware_id, enabled);
        Ok(())
    }

    /// Also accepts hardware ids not seen yet; the flag applies once they appear.
    pub fn set_enabled_by_hardware_id(&self, hardware_id: &str, enabled: bool) {
        let mut st = self.write();
        st.enablement.insert(hardware_id.to_owned(), enabled);
        if let Some(device) = st.devices.iter_mut().find(|d| d.hardware_id == hardware_id) {
            device.enabled = enabled;
        }
        log::debug!("device '{}' enabled={}", hardware_id, enabled);
    }

    pub fn apply_policy(&self, policy: &DevicePolicy) {
        self.write().enable_new_devices = policy.enable_new_devices;
        for hardware_id in &policy.disabled {
            self.set_enabled_by_hardware_id(hardware_id, false);
        }
    }

    /// Whether the interop layer can transfer `format` at all.
    pub fn supports_format(&self, format: ImageFormat) -> bool {
        self.interop.supported_formats().contains(&format.native())
    }

    /// One capture on `device`.
    ///
    /// The registry's current view decides connectivity: a device missing from
    /// the active set or flagged disconnected is refused without touching the
    /// interop. Anything the interop reports afterwards is a fault, since the
    /// device was connected when dispatched, except the whole layer going
    /// away, which is `RegistryUnavailable`.
    pub async fn capture(
        &self,
        device: &Device,
        params: &ImagingParameters,
        format: ImageFormat,
    ) -> Result<Vec<Vec<u8>>, DeviceError> {
        let current = {
            let st = self.read();
            if !st.known_ids.contains_key(&device.hardware_id) {
                return Err(DeviceError::UnknownDevice(device.id));
            }
            st.devices
                .iter()
                .find(|d| d.hardware_id == device.hardware_id)
                .cloned()
        };

        let current = match current {
            Some(d) if d.connected => d,
            _ => {
                return Err(DeviceError::NotConnected {
                    hardware_id: device.hardware_id.clone(),
                })
            }
        };

        let caps = &current.capabilities;
        let unsupported = if !caps.supports_format(format) {
            Some(format!("format {}", format))
        } else if !caps.supports_resolution(params.resolution_dpi) {
            Some(format!("resolution {} dpi", params.resolution_dpi))
        } else if !caps.supports_color_mode(params.color_mode) {
            Some(format!("color mode {:?}", params.color_mode))
        } else {
            None
        };
        if let Some(setting) = unsupported {
            return Err(DeviceError::Unsupported {
                hardware_id: current.hardware_id,
                setting,
            });
        }

        self.interop
            .capture(&current.hardware_id, params, format.native())
            .await
            .map_err(|e| match e {
                InteropError::Unavailable(reason) => DeviceError::RegistryUnavailable(reason),
                other => DeviceError::Fault {
                    hardware_id: current.hardware_id.clone(),
                    reason: other.to_string(),
                },
            })
    }
}
