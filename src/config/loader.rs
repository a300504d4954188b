// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the TOML file, deserializes into `RawConfig`, parses durations and
//! validates the scanning section, producing a runtime `Config`.

use std::{fs, path::Path};

use log::Level;

use crate::config::model::{Config, ConfigError, RawConfig};
use crate::scan_log;
use crate::timer::TimerConfig;

/// Load and validate the configuration at `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    scan_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    scan_log!(
        Level::Info,
        "config",
        "Loaded config from {:?} ({} simulated device(s))",
        path,
        cfg.simulator.devices.len()
    );
    Ok(cfg)
}

/// Parse and validate configuration text.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(txt)?;
    let schedule = TimerConfig::try_from(&raw.schedule)?;
    raw.scanning.validate()?;

    let mut seen = std::collections::HashSet::new();
    for d in &raw.simulator.devices {
        if !seen.insert(d.hardware_id.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "simulated hardware id '{}' declared twice", d.hardware_id
            )));
        }
    }

    Ok(Config {
        logging:   raw.logging,
        schedule,
        scanning:  raw.scanning,
        simulator: raw.simulator,
    })
}
