//! Timer-driven capture fan-out and its notifications.

pub mod checksum;
pub mod events;
pub mod interval;
pub mod progress;
pub mod service;

pub use events::{DeviceCapture, DeviceFailure, RepetitionReport, ScanSummary, Subscription};
pub use interval::IntervalScanningService;
pub use progress::{ChannelProgressSink, ProgressSink, ProgressUpdate};
pub use service::ScanningService;
