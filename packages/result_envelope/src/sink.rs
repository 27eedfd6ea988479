//! Diagnostic sinks for absorbed failures
//!
//! Every failure absorbed by a guard is handed to exactly one
//! [`FailureSink::record`] call. The default [`LogSink`] goes through the
//! `log` facade, so the installed logger decides format and timestamps.

use crate::error::{Failure, FailureKind};
use std::sync::{Mutex, PoisonError};

/// Receiver of the one diagnostic emitted per absorbed failure
pub trait FailureSink: Send + Sync {
    /// Record a failure absorbed by a guard labelled `label`
    fn record(&self, kind: FailureKind, failure: &Failure, label: Option<&str>);
}

/// Sink writing through the `log` facade at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FailureSink for LogSink {
    fn record(&self, kind: FailureKind, failure: &Failure, label: Option<&str>) {
        log::error!("{}", describe(kind, failure, label));
    }
}

/// Log line for one absorbed failure
fn describe(kind: FailureKind, failure: &Failure, label: Option<&str>) -> String {
    match label {
        Some(label) => format!(
            "Guarded work failed: {label} (kind: {}, code: {}): {}",
            kind.as_str(),
            failure.code,
            failure.message
        ),
        None => format!(
            "Guarded work failed (kind: {}, code: {}): {}",
            kind.as_str(),
            failure.code,
            failure.message
        ),
    }
}

/// Sink emitting a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn record(&self, kind: FailureKind, failure: &Failure, label: Option<&str>) {
        tracing::error!(
            kind = kind.as_str(),
            code = failure.code,
            label = label.unwrap_or(""),
            "{}",
            failure.message
        );
    }
}

/// Sink keeping every record in memory, for assertions in tests
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(FailureKind, Failure)>>,
}

impl RecordingSink {
    /// Snapshot of the records so far, oldest first
    #[must_use]
    pub fn records(&self) -> Vec<(FailureKind, Failure)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of failures recorded
    #[must_use]
    pub fn count(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl FailureSink for RecordingSink {
    fn record(&self, kind: FailureKind, failure: &Failure, _label: Option<&str>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, failure.clone()));
    }
}

/// Install a test-mode logger, ignoring an already installed one
pub fn init_test() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}
