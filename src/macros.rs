// src/macros.rs

/// Logs a structured line with timestamp, level, component, pid, tid, and message.
/// Usage:
/// ```rust
/// use log::Level;
/// scan_agent::scan_log!(Level::Debug, "service:tick", "repetition {} dispatching to {} device(s)", 2, 3);
/// scan_agent::scan_log!(Level::Warn, "registry", "enumeration via {} failed: {}", "simulator", "offline");
/// ```
/// Logs like:
/// [2025-04-25T16:32:10+02:00][WARN][registry][pid=4568][tid=ThreadId(3)] enumeration via simulator failed: offline
#[macro_export]
macro_rules! scan_log {
    ($level:expr, $component:expr, $fmt:expr $(, $($arg:tt)+)?) => {
        log::log!(
            $level,
            concat!(
                "[", "{}", "]",          // timestamp
                "[", "{}", "]",          // level via Display
                "[", $component, "]",    // component
                "[pid=", "{}", "]",      // pid
                "[tid=", "{:?}", "] ",   // tid
                $fmt                     // message
            ),
            chrono::Local::now().to_rfc3339(),
            $level,
            std::process::id(),
            std::thread::current().id()
            $(, $($arg)+)?
        );
    };
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    /// A tiny in-memory logger that captures up to DEBUG.
    struct MemoryLogger {
        buffer: Mutex<String>,
    }

    impl MemoryLogger {
        const fn new() -> Self {
            MemoryLogger { buffer: Mutex::new(String::new()) }
        }

        fn take(&self) -> String {
            std::mem::take(&mut *self.buffer.lock().unwrap())
        }
    }

    static LOGGER: MemoryLogger = MemoryLogger::new();

    impl Log for MemoryLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Debug
        }
        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                let mut buf = self.buffer.lock().unwrap();
                buf.push_str(&format!("{}\n", record.args()));
            }
        }
        fn flush(&self) {}
    }

    #[test]
    fn scan_log_emits_expected_text() {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Debug);
        LOGGER.take();

        scan_log!(Level::Debug, "service:tick", "repetition {} dispatching to {} device(s)", 2, 3);
        scan_log!(Level::Warn, "registry", "enumeration via {} failed: {}", "simulator", "offline");

        let output = LOGGER.take();
        let tick = output.lines().find(|l| l.contains("[service:tick]")).unwrap_or_default();
        let registry = output.lines().find(|l| l.contains("[registry]")).unwrap_or_default();
        assert!(tick.contains("[DEBUG][service:tick]"), "missing level/component: {}", output);
        assert!(tick.ends_with("repetition 2 dispatching to 3 device(s)"), "payload: {}", tick);
        assert!(registry.contains("[WARN][registry]"), "missing level/component: {}", output);
        assert!(registry.ends_with("enumeration via simulator failed: offline"), "payload: {}", registry);
        assert!(output.contains(&format!("[pid={}]", std::process::id())), "missing pid: {}", output);
        assert!(tick.starts_with('[') && registry.starts_with('['), "should start with timestamp: {}", output);
    }
}
