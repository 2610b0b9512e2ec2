//! Asynchronous reporting channel shared by every stage worker.
//!
//! Runtime failures never travel down the data path. Workers describe them as
//! a [`Report`] and hand it to the pipeline's [`Feedback`] handle, which may be
//! invoked from many worker threads at once.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        })
    }
}

/// One feedback event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub severity: Severity,
    /// Name of the stage that produced the report
    pub stage: String,
    pub message: String,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.stage, self.message)
    }
}

/// Receives reports. Implementations must be callable concurrently and must
/// not block the calling worker for long.
pub trait FeedbackSink: Send + Sync {
    fn report(&self, report: Report);
}

impl<F> FeedbackSink for F
where
    F: Fn(Report) + Send + Sync,
{
    fn report(&self, report: Report) {
        self(report)
    }
}

/// Cloneable handle to a feedback sink, labelled with the stage that reports through it
#[derive(Clone)]
pub struct Feedback {
    sink: Arc<dyn FeedbackSink>,
    stage: Arc<str>,
}

impl Feedback {
    pub fn new(sink: impl FeedbackSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            stage: Arc::from("pipeline"),
        }
    }

    /// Feedback rendered through `tracing`
    pub fn tracing() -> Self {
        Self::new(TracingSink)
    }

    /// A handle to the same sink that labels its reports with `stage`
    pub fn for_stage(&self, stage: &str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            stage: Arc::from(stage),
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn report(&self, severity: Severity, message: impl Into<String>) {
        self.sink.report(Report {
            severity,
            stage: self.stage.to_string(),
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.report(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.report(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.report(Severity::Error, message);
    }
}

impl fmt::Debug for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feedback")
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

/// Emits every report as a `tracing` event at the matching level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FeedbackSink for TracingSink {
    fn report(&self, report: Report) {
        match report.severity {
            Severity::Info => tracing::info!(stage = %report.stage, "{}", report.message),
            Severity::Warn => tracing::warn!(stage = %report.stage, "{}", report.message),
            Severity::Error => tracing::error!(stage = %report.stage, "{}", report.message),
        }
    }
}

/// Keeps every report in memory
#[derive(Debug, Clone, Default)]
pub struct Collector {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A feedback handle that appends to this collector
    pub fn feedback(&self) -> Feedback {
        Feedback::new(self.clone())
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.reports.lock().iter().map(|r| r.message.clone()).collect()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.severity == severity)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl FeedbackSink for Collector {
    fn report(&self, report: Report) {
        self.reports.lock().push(report);
    }
}
