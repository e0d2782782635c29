use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::FileFormat;

/// Infrastructure-level errors (database, serialization, IO).
///
/// Pipeline failures are not modeled here: they travel as [`ParseFailure`]
/// values so the retry orchestrator can inspect them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("Invalid failure kind: {0}")]
    InvalidFailureKind(String),

    #[error("Invalid quality tier: {0}")]
    InvalidQualityTier(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of pipeline failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingRequiredFields,
    TextExtractionFailed,
    AiParsingFailed,
    FileTypeUnsupported,
    FileCorrupted,
    ContactExtractionFailed,
    Unknown,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRequiredFields => "missing_required_fields",
            Self::TextExtractionFailed => "text_extraction_failed",
            Self::AiParsingFailed => "ai_parsing_failed",
            Self::FileTypeUnsupported => "file_type_unsupported",
            Self::FileCorrupted => "file_corrupted",
            Self::ContactExtractionFailed => "contact_extraction_failed",
            Self::Unknown => "unknown",
        }
    }

    /// Validation rejections are terminal and `Unknown` fails fast; every
    /// other category re-enters the pipeline with an escalated strategy.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::FileTypeUnsupported | Self::FileCorrupted | Self::Unknown
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "missing_required_fields" => Ok(Self::MissingRequiredFields),
            "text_extraction_failed" => Ok(Self::TextExtractionFailed),
            "ai_parsing_failed" => Ok(Self::AiParsingFailed),
            "file_type_unsupported" => Ok(Self::FileTypeUnsupported),
            "file_corrupted" => Ok(Self::FileCorrupted),
            "contact_extraction_failed" => Ok(Self::ContactExtractionFailed),
            "unknown" => Ok(Self::Unknown),
            _ => Err(Error::InvalidFailureKind(s.to_string())),
        }
    }
}

/// Where in the pipeline a failure happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    pub filename: String,
    pub file_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_format: Option<FileFormat>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps_completed: Vec<String>,
}

impl FailureContext {
    #[must_use]
    pub fn new(filename: impl Into<String>, file_size: usize) -> Self {
        Self {
            filename: filename.into(),
            file_size,
            detected_format: None,
            timestamp: Utc::now(),
            steps_completed: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.detected_format = Some(format);
        self
    }

    pub fn record_step(&mut self, step: impl Into<String>) {
        self.steps_completed.push(step.into());
    }
}

/// One failed processing attempt, with machine-readable detail.
///
/// Appended to the attempt log; never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
    pub context: FailureContext,
}

impl ParseFailure {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>, context: FailureContext) -> Self {
        Self {
            kind,
            message: message.into(),
            details: serde_json::Value::Null,
            context,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn missing_fields(missing: &[String], context: FailureContext) -> Self {
        Self::new(
            FailureKind::MissingRequiredFields,
            format!("Missing required fields: {}", missing.join(", ")),
            context,
        )
        .with_details(serde_json::json!({ "missing_fields": missing }))
    }

    #[must_use]
    pub fn text_extraction(reason: impl Into<String>, context: FailureContext) -> Self {
        let reason = reason.into();
        let format = context
            .detected_format
            .map_or_else(|| "unknown".to_string(), |f| f.to_string());
        Self::new(
            FailureKind::TextExtractionFailed,
            format!("Failed to extract text from {format}: {reason}"),
            context,
        )
        .with_details(serde_json::json!({ "reason": reason, "format": format }))
    }

    #[must_use]
    pub fn ai_parsing(reason: impl Into<String>, context: FailureContext) -> Self {
        let reason = reason.into();
        Self::new(
            FailureKind::AiParsingFailed,
            format!("Structured field extraction failed: {reason}"),
            context,
        )
        .with_details(serde_json::json!({ "reason": reason }))
    }

    #[must_use]
    pub fn unknown(reason: impl Into<String>, context: FailureContext) -> Self {
        let reason = reason.into();
        Self::new(
            FailureKind::Unknown,
            format!("Unexpected error: {reason}"),
            context,
        )
        .with_details(serde_json::json!({ "reason": reason }))
    }

    /// Static, user-facing template keyed by kind. The raw `message` stays
    /// available alongside this for operators.
    #[must_use]
    pub fn friendly_message(&self) -> String {
        match self.kind {
            FailureKind::MissingRequiredFields => self.missing_fields_message(),
            FailureKind::TextExtractionFailed => {
                "Could not read the file content. Please try a different file \
                 format (PDF or DOCX) or make sure the file is not corrupted."
                    .to_string()
            }
            FailureKind::AiParsingFailed => {
                "The resume content could not be processed. Please check that \
                 the file is readable and try again."
                    .to_string()
            }
            FailureKind::FileTypeUnsupported => {
                "This file type is not supported. Please upload a PDF or DOCX \
                 file."
                    .to_string()
            }
            FailureKind::FileCorrupted => {
                "The file appears to be corrupted or damaged. Please try \
                 uploading it again or use a different file."
                    .to_string()
            }
            FailureKind::ContactExtractionFailed => {
                "Could not find contact information in the resume. Please make \
                 sure it contains a clear email address and phone number."
                    .to_string()
            }
            FailureKind::Unknown => {
                "An unexpected error occurred while processing this resume. \
                 Please try again or contact support if the problem persists."
                    .to_string()
            }
        }
    }

    fn missing_fields_message(&self) -> String {
        let fields: Vec<String> = self
            .details
            .get("missing_fields")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(friendly_field_name)
                    .collect()
            })
            .unwrap_or_default();

        match fields.as_slice() {
            [] => "Could not find required contact information in the resume.".to_string(),
            [only] => format!(
                "Could not find {only} in the resume. Please make sure it is stated clearly."
            ),
            [rest @ .., last] => format!(
                "Could not find {} and {} in the resume. Please make sure they are stated clearly.",
                rest.join(", "),
                last
            ),
        }
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

fn friendly_field_name(field: &str) -> String {
    match field.to_lowercase().as_str() {
        "email" => "an email address".to_string(),
        "phone" => "a phone number".to_string(),
        "name" => "a name".to_string(),
        "skills" => "a skills section".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::MissingRequiredFields.is_retryable());
        assert!(FailureKind::AiParsingFailed.is_retryable());
        assert!(FailureKind::TextExtractionFailed.is_retryable());
        assert!(!FailureKind::FileCorrupted.is_retryable());
        assert!(!FailureKind::FileTypeUnsupported.is_retryable());
        assert!(!FailureKind::Unknown.is_retryable());
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            FailureKind::MissingRequiredFields,
            FailureKind::TextExtractionFailed,
            FailureKind::AiParsingFailed,
            FailureKind::FileTypeUnsupported,
            FailureKind::FileCorrupted,
            FailureKind::ContactExtractionFailed,
            FailureKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<FailureKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_missing_fields_message_lists_friendly_names() {
        let failure = ParseFailure::missing_fields(
            &["Email".to_string(), "Phone".to_string()],
            FailureContext::new("resume.pdf", 1024),
        );

        let msg = failure.friendly_message();
        assert!(msg.contains("an email address"));
        assert!(msg.contains("a phone number"));
    }

    #[test]
    fn test_single_missing_field_message() {
        let failure = ParseFailure::missing_fields(
            &["Name".to_string()],
            FailureContext::new("resume.pdf", 1024),
        );

        assert!(failure.friendly_message().contains("a name"));
    }

    #[test]
    fn test_context_steps() {
        let mut ctx = FailureContext::new("cv.docx", 2048);
        ctx.record_step("text_extraction");
        ctx.record_step("normalization");

        assert_eq!(ctx.steps_completed, vec!["text_extraction", "normalization"]);
    }
}
