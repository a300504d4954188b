// src/main.rs

//! Console runner.
//!
//! 1. Load configuration (`argv[1]`, or `default.toml` next to the executable)
//! 2. Set up structured logging
//! 3. Build the device registry over the simulated interop
//! 4. Run the configured schedule, logging every notification
//! 5. Stop cleanly on schedule exhaustion or Ctrl-C
//!

// ───── std / 3rd-party imports ──────────────────────────────────────────────
use anyhow::Context;
use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
    thread,
};
use tokio::runtime::Runtime;

// ───── local imports ────────────────────────────────────────────────────────
use scan_agent::config::{self, model::LoggingConfig, Config};
use scan_agent::devices::{DeviceRegistry, SimulatedInterop};
use scan_agent::scanning::{ChannelProgressSink, IntervalScanningService, ProgressUpdate};

const DEFAULT_CONFIG: &str = "default.toml";

// ───── helpers ──────────────────────────────────────────────────────────────

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            chrono::Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

/// Directory that contains the running executable.
fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configure global logging as requested in `[logging]`.
fn setup_logging(log_dir: &Path, logging: &LoggingConfig) -> Result<(), fern::InitError> {
    let level = match logging.level.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let log_path = logging
        .enable
        .then(|| log_dir.join(logging.file.as_deref().unwrap_or("scan-agent.log")));

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

// ───── run loop ─────────────────────────────────────────────────────────────

fn log_progress(update: &ProgressUpdate) {
    log::debug!(
        "progress: repetition {} {} pages={} bytes={} failed={}",
        update.repetition,
        update.hardware_id,
        update.pages_captured,
        update.bytes_captured,
        update.failed
    );
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    let interop = Arc::new(SimulatedInterop::new(cfg.simulator.devices.clone()));
    let registry = Arc::new(DeviceRegistry::new(interop));
    let service = IntervalScanningService::new(registry, cfg.scanning.clone())
        .context("scanning configuration rejected")?;

    let mut refreshed = service.subscribe_devices_refreshed();
    let mut repetitions = service.subscribe_repetition_completed();
    let mut completed = service.subscribe_scanning_completed();
    let (sink, mut progress) = ChannelProgressSink::new(256);

    service
        .start_with(cfg.schedule, Some(Arc::new(sink)))
        .await
        .context("failed to start scanning")?;

    loop {
        tokio::select! {
            Some(snapshot) = refreshed.recv() => {
                log::info!(
                    "devices refreshed: {} present (interop available: {})",
                    snapshot.devices.len(),
                    snapshot.interop_available
                );
            }
            Some(update) = progress.recv() => log_progress(&update),
            Some(report) = repetitions.recv() => {
                log::info!("repetition report: {}", serde_json::to_string(&*report)?);
            }
            summary = completed.recv() => {
                // select! may pick this branch while earlier events still sit queued.
                while let Ok(update) = progress.try_recv() {
                    log_progress(&update);
                }
                for report in repetitions.drain() {
                    log::info!("repetition report: {}", serde_json::to_string(&*report)?);
                }
                if let Some(summary) = summary {
                    log::info!("scan summary: {}", serde_json::to_string(&summary)?);
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                log::warn!("Ctrl-C received, stopping after the current repetition");
                service.stop_scanning(true).await;
            }
        }
    }

    log::info!(
        "run window: {:?} → {:?}",
        service.start_time(),
        service.finish_time()
    );
    Ok(())
}

fn main() {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| exe_dir().join(DEFAULT_CONFIG));

    let cfg = config::load(&config_path).unwrap_or_else(|e| fatal!("config", "{}", e));

    let log_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(exe_dir);
    setup_logging(&log_dir, &cfg.logging).unwrap_or_else(|e| fatal!("logging", "{}", e));
    log::info!("scan-agent starting with {:?}", config_path);

    let rt = Runtime::new().unwrap_or_else(|e| fatal!("runtime", "{}", e));
    if let Err(e) = rt.block_on(run(cfg)) {
        log::error!("{:#}", e);
        process::exit(1);
    }
    log::info!("scan-agent stopped cleanly");
}
