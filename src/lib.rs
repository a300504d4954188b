// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

pub mod config;
pub mod devices;
pub mod error;
pub mod macros;
pub mod scanning;
pub mod timer;

pub use error::ScanError;
pub use scanning::{IntervalScanningService, ScanningService};
pub use timer::{IntervalTimer, TimerConfig, TimerEvent};
