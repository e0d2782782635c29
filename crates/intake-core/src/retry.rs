use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;
use crate::error::{FailureContext, FailureKind, ParseFailure};
use crate::ingest::{FormatValidator, ParsedResume, ResumePipeline, ValidationResult};
use crate::quality::QualityTier;
use crate::report::ErrorReporter;

/// How an attempt re-derives its input. Escalation changes *how* text and
/// contact info are produced, not merely how often the same logic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Standard,
    EnhancedPreprocessing,
    FallbackExtraction,
    ManualExtraction,
}

impl RetryStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::EnhancedPreprocessing => "enhanced_preprocessing",
            Self::FallbackExtraction => "fallback_extraction",
            Self::ManualExtraction => "manual_extraction",
        }
    }
}

impl std::fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escalation chain for retries after a failure of the given kind. The
/// first retry uses the first entry, and so on; past the end of the chain
/// attempts fall back to `Standard`.
fn escalation(kind: FailureKind) -> &'static [RetryStrategy] {
    match kind {
        FailureKind::AiParsingFailed => &[
            RetryStrategy::EnhancedPreprocessing,
            RetryStrategy::FallbackExtraction,
            RetryStrategy::Standard,
        ],
        _ => &[
            RetryStrategy::EnhancedPreprocessing,
            RetryStrategy::FallbackExtraction,
            RetryStrategy::ManualExtraction,
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// One entry in a file's attempt log; the log is ordered and append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub strategy: RetryStrategy,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ParseFailure>,
}

/// Terminal, immutable outcome of processing one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedResume>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ParseFailure>,
    /// Taxonomy-derived message suitable for end users; failures only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_error: Option<String>,
    pub attempts: Vec<RetryAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityTier>,
    pub duration_ms: u64,
}

/// Rolling processor counters; diagnostics only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessorMetrics {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
}

/// Front door for single-file processing: terminal validation once, then
/// the strategy-escalating attempt loop with exponential backoff.
pub struct ResumeProcessor {
    validator: FormatValidator,
    pipeline: ResumePipeline,
    retry: RetryConfig,
    reporter: Arc<ErrorReporter>,
    metrics: Mutex<ProcessorMetrics>,
}

impl ResumeProcessor {
    #[must_use]
    pub fn new(validator: FormatValidator, pipeline: ResumePipeline, retry: RetryConfig) -> Self {
        Self {
            validator,
            pipeline,
            retry,
            reporter: Arc::new(ErrorReporter::new()),
            metrics: Mutex::new(ProcessorMetrics::default()),
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn reporter(&self) -> Arc<ErrorReporter> {
        Arc::clone(&self.reporter)
    }

    #[must_use]
    pub fn metrics(&self) -> ProcessorMetrics {
        self.metrics.lock().map(|m| *m).unwrap_or_default()
    }

    /// Process one file to a terminal result. Validation rejections are
    /// final; every retryable failure re-enters the pipeline under the
    /// strategy chosen by the previous failure's kind.
    pub async fn submit(&self, data: &[u8], filename: &str) -> ProcessingResult {
        let started = Instant::now();

        let validation = self.validator.validate(data, filename);
        let Some(format) = validation.detected_format.filter(|_| validation.is_valid) else {
            let failure = validation_failure(&validation, filename, data.len());
            self.reporter.record(&failure);
            self.bump(false);
            return ProcessingResult {
                success: false,
                filename: filename.to_string(),
                parsed: None,
                friendly_error: Some(failure.friendly_message()),
                error: Some(failure.clone()),
                attempts: vec![RetryAttempt {
                    attempt_number: 1,
                    strategy: RetryStrategy::Standard,
                    outcome: AttemptOutcome::Failure,
                    duration_ms: to_millis(started.elapsed()),
                    error: Some(failure),
                }],
                quality: None,
                duration_ms: to_millis(started.elapsed()),
            };
        };

        let mut attempts: Vec<RetryAttempt> = Vec::new();
        let mut last_failure: Option<ParseFailure> = None;

        for attempt in 0..=self.retry.max_retries {
            let strategy = match (&last_failure, attempt) {
                (_, 0) | (None, _) => RetryStrategy::Standard,
                (Some(failure), n) => escalation(failure.kind)
                    .get((n - 1) as usize)
                    .copied()
                    .unwrap_or(RetryStrategy::Standard),
            };

            let attempt_started = Instant::now();
            match self.pipeline.run(data, filename, format, strategy).await {
                Ok(parsed) => {
                    attempts.push(RetryAttempt {
                        attempt_number: attempt + 1,
                        strategy,
                        outcome: AttemptOutcome::Success,
                        duration_ms: to_millis(attempt_started.elapsed()),
                        error: None,
                    });
                    tracing::info!(
                        filename,
                        attempt = attempt + 1,
                        strategy = strategy.as_str(),
                        "resume processed",
                    );
                    self.bump(true);
                    return ProcessingResult {
                        success: true,
                        filename: filename.to_string(),
                        quality: Some(parsed.quality.tier),
                        parsed: Some(parsed),
                        error: None,
                        friendly_error: None,
                        attempts,
                        duration_ms: to_millis(started.elapsed()),
                    };
                }
                Err(failure) => {
                    tracing::warn!(
                        filename,
                        attempt = attempt + 1,
                        strategy = strategy.as_str(),
                        kind = failure.kind.as_str(),
                        "attempt failed: {}",
                        failure.message,
                    );
                    self.reporter.record(&failure);
                    attempts.push(RetryAttempt {
                        attempt_number: attempt + 1,
                        strategy,
                        outcome: AttemptOutcome::Failure,
                        duration_ms: to_millis(attempt_started.elapsed()),
                        error: Some(failure.clone()),
                    });

                    let retryable = failure.kind.is_retryable();
                    last_failure = Some(failure);

                    if !retryable || attempt == self.retry.max_retries {
                        break;
                    }

                    tokio::time::sleep(backoff_delay(attempt, &self.retry)).await;
                }
            }
        }

        self.bump(false);
        let error = last_failure.unwrap_or_else(|| {
            ParseFailure::unknown(
                "attempt loop ended without a recorded failure",
                FailureContext::new(filename, data.len()).with_format(format),
            )
        });
        ProcessingResult {
            success: false,
            filename: filename.to_string(),
            parsed: None,
            friendly_error: Some(error.friendly_message()),
            error: Some(error),
            attempts,
            quality: None,
            duration_ms: to_millis(started.elapsed()),
        }
    }

    fn bump(&self, success: bool) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.total_processed += 1;
            if success {
                metrics.successful += 1;
            } else {
                metrics.failed += 1;
            }
        }
    }
}

/// Map a validation rejection onto the taxonomy: corruption keeps its own
/// kind; metadata and everything else surface as unsupported, with the
/// metadata flag preserved in the details.
fn validation_failure(
    validation: &ValidationResult,
    filename: &str,
    size: usize,
) -> ParseFailure {
    let message = validation
        .error_message
        .clone()
        .unwrap_or_else(|| "File failed validation".to_string());
    let mut context = FailureContext::new(filename, size);
    if let Some(format) = validation.detected_format {
        context = context.with_format(format);
    }

    let kind = if validation.is_corrupted {
        FailureKind::FileCorrupted
    } else {
        FailureKind::FileTypeUnsupported
    };

    ParseFailure::new(kind, message, context).with_details(serde_json::json!({
        "is_metadata": validation.is_metadata_file,
    }))
}

fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config.base_delay().as_millis() as f64;
    let exponential = base * 2f64.powi(attempt as i32);
    let jittered = exponential * rand::rng().random_range(0.9..=1.1);
    let capped = jittered.min(config.max_delay().as_millis() as f64);
    Duration::from_millis(capped as u64)
}

fn to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;

    #[test]
    fn test_escalation_for_contact_failures() {
        let chain = escalation(FailureKind::MissingRequiredFields);
        assert_eq!(
            chain,
            &[
                RetryStrategy::EnhancedPreprocessing,
                RetryStrategy::FallbackExtraction,
                RetryStrategy::ManualExtraction,
            ]
        );
    }

    #[test]
    fn test_escalation_for_ai_failures_ends_standard() {
        let chain = escalation(FailureKind::AiParsingFailed);
        assert_eq!(chain.last(), Some(&RetryStrategy::Standard));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        };

        let first = backoff_delay(0, &config);
        assert!(first >= Duration::from_millis(900));
        assert!(first <= Duration::from_millis(1_100));

        let huge = backoff_delay(10, &config);
        assert!(huge <= Duration::from_millis(30_000));
    }
}
