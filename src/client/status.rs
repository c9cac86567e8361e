use std::sync::Arc;

use parking_lot::Mutex;

use super::types::Handle;

/// Severity levels reported through a [`StatusCallback`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusSeverity {
    FatalError,
    Error,
    Warning,
    PerformanceWarning,
    Info,
    Debug,
}

/// How the harness treats a report of a given severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    /// Terminates the process.
    Fatal,
    /// Printed; execution continues.
    Recoverable,
    /// Dropped.
    Suppressed,
}

impl StatusSeverity {
    pub fn class(self) -> StatusClass {
        match self {
            Self::FatalError => StatusClass::Fatal,
            Self::Error | Self::Warning | Self::PerformanceWarning => StatusClass::Recoverable,
            Self::Info | Self::Debug => StatusClass::Suppressed,
        }
    }

    /// Fixed-width tag used in printed status lines.
    pub fn tag(self) -> &'static str {
        match self {
            Self::FatalError => "FATAL",
            Self::Error => "ERROR",
            Self::Warning => "WARN ",
            Self::PerformanceWarning => "PERF ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatusReport {
    pub severity: StatusSeverity,
    /// Object the report originates from, if any.
    pub source: Option<Handle>,
    pub message: String,
}

impl StatusReport {
    pub fn new(
        severity: StatusSeverity,
        source: Option<Handle>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            source,
            message: message.into(),
        }
    }
}

/// Receives every status report a library or device produces. Called from any thread.
pub type StatusCallback = Arc<dyn Fn(&StatusReport) + Send + Sync>;

/// Printed form of a report, or `None` for suppressed severities.
pub fn format_status(report: &StatusReport) -> Option<String> {
    if report.severity.class() == StatusClass::Suppressed {
        return None;
    }
    let source = match report.source {
        Some(h) => h.to_string(),
        None => "device".to_string(),
    };
    Some(format!(
        "[{}][{}] {}",
        report.severity.tag(),
        source,
        report.message
    ))
}

/// What a fatal report does after it is printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatalAction {
    /// `std::process::exit` with the given code. No unwinding, no handle cleanup.
    Exit(i32),
    /// Panic on the reporting thread.
    Panic,
}

/// Status callback that prints tagged lines to stderr.
pub fn stderr_status_callback(on_fatal: FatalAction) -> StatusCallback {
    Arc::new(move |report: &StatusReport| {
        let Some(line) = format_status(report) else {
            return;
        };
        eprintln!("{line}");
        if report.severity.class() == StatusClass::Fatal {
            tracing::error!(source = ?report.source, "fatal status report, terminating");
            match on_fatal {
                FatalAction::Exit(code) => std::process::exit(code),
                FatalAction::Panic => panic!("{line}"),
            }
        }
    })
}

/// Collects every report, for inspection after a run.
#[derive(Clone, Debug, Default)]
pub struct StatusLog {
    reports: Arc<Mutex<Vec<StatusReport>>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> StatusCallback {
        let reports = Arc::clone(&self.reports);
        Arc::new(move |report: &StatusReport| reports.lock().push(report.clone()))
    }

    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports.lock().clone()
    }

    pub fn count(&self, severity: StatusSeverity) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.severity == severity)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ObjectKind;

    #[test]
    fn severities_map_to_taxonomy() {
        assert_eq!(StatusSeverity::FatalError.class(), StatusClass::Fatal);
        assert_eq!(StatusSeverity::Error.class(), StatusClass::Recoverable);
        assert_eq!(StatusSeverity::Warning.class(), StatusClass::Recoverable);
        assert_eq!(
            StatusSeverity::PerformanceWarning.class(),
            StatusClass::Recoverable
        );
        assert_eq!(StatusSeverity::Info.class(), StatusClass::Suppressed);
        assert_eq!(StatusSeverity::Debug.class(), StatusClass::Suppressed);
    }

    #[test]
    fn format_includes_tag_and_source() {
        let r = StatusReport::new(
            StatusSeverity::Warning,
            Some(Handle::new(7, ObjectKind::Camera)),
            "unknown parameter 'fov'",
        );
        assert_eq!(
            format_status(&r).as_deref(),
            Some("[WARN ][Camera#7] unknown parameter 'fov'")
        );

        let r = StatusReport::new(StatusSeverity::PerformanceWarning, None, "slow path");
        assert_eq!(format_status(&r).as_deref(), Some("[PERF ][device] slow path"));
    }

    #[test]
    fn info_and_debug_are_suppressed() {
        for severity in [StatusSeverity::Info, StatusSeverity::Debug] {
            assert!(format_status(&StatusReport::new(severity, None, "x")).is_none());
        }
    }

    #[test]
    fn status_log_records_from_many_threads() {
        let log = StatusLog::new();
        let cb = log.callback();
        std::thread::scope(|s| {
            for _ in 0..4 {
                let cb = Arc::clone(&cb);
                s.spawn(move || {
                    cb(&StatusReport::new(StatusSeverity::Error, None, "e"));
                });
            }
        });
        assert_eq!(log.count(StatusSeverity::Error), 4);
        assert_eq!(log.reports().len(), 4);
    }

    #[test]
    #[should_panic(expected = "[FATAL]")]
    fn panic_action_panics_on_fatal() {
        let cb = stderr_status_callback(FatalAction::Panic);
        cb(&StatusReport::new(StatusSeverity::FatalError, None, "boom"));
    }
}
