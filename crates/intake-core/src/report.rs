use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, ParseFailure};

const RECENT_CAPACITY: usize = 100;

/// Condensed view of a recorded failure for the ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentFailure {
    pub timestamp: DateTime<Utc>,
    pub filename: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Snapshot of accumulated error metrics. Read-only diagnostics; nothing in
/// the pipeline branches on these values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub total_errors: u64,
    pub breakdown: HashMap<FailureKind, u64>,
    pub recent: Vec<RecentFailure>,
}

#[derive(Debug, Default)]
struct ReporterState {
    total_errors: u64,
    breakdown: HashMap<FailureKind, u64>,
    recent: VecDeque<RecentFailure>,
}

/// Process-wide failure accounting: totals, a per-kind breakdown, and a
/// bounded buffer of the most recent failures.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    state: Mutex<ReporterState>,
}

impl ErrorReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, failure: &ParseFailure) {
        tracing::error!(
            kind = failure.kind.as_str(),
            filename = %failure.context.filename,
            file_size = failure.context.file_size,
            steps = ?failure.context.steps_completed,
            "resume processing failed: {}",
            failure.message,
        );

        let Ok(mut state) = self.state.lock() else {
            return;
        };

        state.total_errors += 1;
        *state.breakdown.entry(failure.kind).or_insert(0) += 1;

        state.recent.push_back(RecentFailure {
            timestamp: failure.context.timestamp,
            filename: failure.context.filename.clone(),
            kind: failure.kind,
            message: failure.message.clone(),
        });
        while state.recent.len() > RECENT_CAPACITY {
            state.recent.pop_front();
        }
    }

    #[must_use]
    pub fn metrics(&self) -> ErrorMetrics {
        let Ok(state) = self.state.lock() else {
            return ErrorMetrics::default();
        };

        ErrorMetrics {
            total_errors: state.total_errors,
            breakdown: state.breakdown.clone(),
            recent: state.recent.iter().cloned().collect(),
        }
    }

    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<RecentFailure> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };

        state
            .recent
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureContext;

    fn failure(name: &str) -> ParseFailure {
        ParseFailure::ai_parsing("empty response", FailureContext::new(name, 100))
    }

    #[test]
    fn test_counters_accumulate() {
        let reporter = ErrorReporter::new();
        reporter.record(&failure("a.pdf"));
        reporter.record(&failure("b.pdf"));

        let metrics = reporter.metrics();
        assert_eq!(metrics.total_errors, 2);
        assert_eq!(metrics.breakdown[&FailureKind::AiParsingFailed], 2);
    }

    #[test]
    fn test_ring_buffer_is_bounded() {
        let reporter = ErrorReporter::new();
        for i in 0..150 {
            reporter.record(&failure(&format!("{i}.pdf")));
        }

        let metrics = reporter.metrics();
        assert_eq!(metrics.recent.len(), RECENT_CAPACITY);
        // Oldest entries were evicted.
        assert_eq!(metrics.recent[0].filename, "50.pdf");
    }

    #[test]
    fn test_recent_returns_newest_first() {
        let reporter = ErrorReporter::new();
        reporter.record(&failure("old.pdf"));
        reporter.record(&failure("new.pdf"));

        let recent = reporter.recent(1);
        assert_eq!(recent[0].filename, "new.pdf");
    }
}
