use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::contact::ContactRecoverer;
use super::extractor::TextExtractor;
use super::normalizer::{NormalizeMode, TextNormalizer};
use super::validator::FileFormat;
use crate::ai::{Embedder, ExtractError, FieldExtractor};
use crate::candidate::{CandidateProfile, ContactInfo};
use crate::config::ProcessingConfig;
use crate::error::{FailureContext, ParseFailure};
use crate::ocr::{OcrEngine, PopplerBackend, TesseractOcr};
use crate::quality::{classify, QualityReport};
use crate::retry::RetryStrategy;

/// Zone size used by the manual-extraction strategy.
const ZONE_LINES: usize = 10;

/// Manual extraction only accepts a zone hit above this confidence.
const MANUAL_MIN_CONFIDENCE: f64 = 0.5;

/// Successful single-attempt output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedResume {
    pub profile: CandidateProfile,
    pub contact: ContactInfo,
    pub quality: QualityReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub text_chars: usize,
}

/// One pass through the full pipeline for a single file:
/// extract → normalize → (structured extraction ∥ embedding) → contact
/// splice → field validation → quality classification.
///
/// Failures come back as typed [`ParseFailure`] values; the retry
/// orchestrator picks the next strategy from them.
pub struct ResumePipeline {
    extractor: TextExtractor,
    normalizer: TextNormalizer,
    recoverer: ContactRecoverer,
    fields: Arc<dyn FieldExtractor>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ResumePipeline {
    /// Production wiring: poppler for PDFs, tesseract for OCR when present.
    #[must_use]
    pub fn new(config: &ProcessingConfig, fields: Arc<dyn FieldExtractor>) -> Self {
        let ocr = TesseractOcr::new();
        let ocr: Option<Arc<dyn OcrEngine>> = if ocr.available() {
            Some(Arc::new(ocr))
        } else {
            tracing::info!("tesseract not found, OCR fallbacks disabled");
            None
        };

        let extractor = TextExtractor::new(
            config.limits.clone(),
            config.ocr.clone(),
            Arc::new(PopplerBackend::new()),
            ocr,
        );

        Self {
            extractor,
            normalizer: TextNormalizer::new(config.normalizer.clone()),
            recoverer: ContactRecoverer::new(),
            fields,
            embedder: None,
        }
    }

    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub async fn run(
        &self,
        data: &[u8],
        filename: &str,
        format: FileFormat,
        strategy: RetryStrategy,
    ) -> Result<ParsedResume, ParseFailure> {
        let mut ctx = FailureContext::new(filename, data.len()).with_format(format);

        let raw_text = self
            .extractor
            .extract(data, format)
            .await
            .map_err(|e| ParseFailure::text_extraction(e.to_string(), ctx.clone()))?;
        ctx.record_step("text_extraction");

        let mode = if strategy == RetryStrategy::EnhancedPreprocessing {
            NormalizeMode::Strict
        } else {
            NormalizeMode::Standard
        };
        let (text, stats) = self.normalizer.normalize(&raw_text, mode);
        ctx.record_step("normalization");
        tracing::debug!(
            filename,
            original = stats.original_len,
            normalized = stats.normalized_len,
            "text normalized",
        );

        let contact = self.recoverer.recover(&text);
        ctx.record_step("contact_extraction");

        let extract_future = self.fields.extract(&text);
        let (parsed, embedding) = if let Some(embedder) = &self.embedder {
            tokio::join!(extract_future, embedder.embed(&text))
        } else {
            (extract_future.await, None)
        };
        ctx.record_step("ai_parsing");

        let mut profile = parsed.map_err(|e| match e {
            ExtractError::Internal(reason) => ParseFailure::unknown(reason, ctx.clone()),
            other => ParseFailure::ai_parsing(other.to_string(), ctx.clone()),
        })?;

        // Recovered contact info backfills what the structured extraction
        // missed, on every attempt.
        profile.fill_contact_gaps(&contact);

        match strategy {
            RetryStrategy::FallbackExtraction => {
                let fallback = self.recoverer.recover(&text);
                if fallback.has_both() {
                    profile.fill_contact_gaps(&fallback);
                }
            }
            RetryStrategy::ManualExtraction => {
                if let Some(best) = self.best_zone_contact(&text) {
                    profile.fill_contact_gaps(&best);
                }
            }
            RetryStrategy::Standard | RetryStrategy::EnhancedPreprocessing => {}
        }

        let missing = profile.missing_essentials();
        if !missing.is_empty() {
            return Err(ParseFailure::missing_fields(&missing, ctx.clone()));
        }
        ctx.record_step("field_validation");

        let quality = classify(&profile);

        Ok(ParsedResume {
            profile,
            contact,
            quality,
            embedding,
            text_chars: text.chars().count(),
        })
    }

    /// Manual-extraction zones: document header, footer, and an explicit
    /// contact section, each scanned independently; the highest-confidence
    /// hit wins if it clears the acceptance floor.
    fn best_zone_contact(&self, text: &str) -> Option<ContactInfo> {
        let mut best: Option<ContactInfo> = None;

        for zone in contact_zones(text) {
            if zone.trim().is_empty() {
                continue;
            }
            let candidate = self.recoverer.recover(&zone);
            let better = best
                .as_ref()
                .is_none_or(|b| candidate.confidence > b.confidence);
            if better {
                best = Some(candidate);
            }
        }

        best.filter(|info| info.confidence > MANUAL_MIN_CONFIDENCE)
    }
}

fn contact_zones(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();

    let header = lines
        .iter()
        .take(ZONE_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let footer = lines
        .iter()
        .skip(lines.len().saturating_sub(ZONE_LINES))
        .copied()
        .collect::<Vec<_>>()
        .join("\n");

    let mut section = Vec::new();
    let mut in_section = false;
    for line in &lines {
        let lower = line.to_lowercase();
        if !in_section
            && (lower.contains("contact")
                || lower.contains("personal information")
                || lower.contains("reach me"))
        {
            in_section = true;
            section.push(*line);
            continue;
        }
        if in_section {
            if lower.contains("experience")
                || lower.contains("education")
                || lower.contains("skills")
            {
                break;
            }
            section.push(*line);
        }
    }

    vec![header, footer, section.join("\n")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ExtractResult;
    use crate::quality::QualityTier;

    struct FixedFields {
        profile: CandidateProfile,
    }

    #[async_trait::async_trait]
    impl FieldExtractor for FixedFields {
        async fn extract(&self, _text: &str) -> ExtractResult<CandidateProfile> {
            Ok(self.profile.clone())
        }
    }

    struct FixedEmbedder;

    #[async_trait::async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
            Some(vec![0.25, 0.5])
        }
    }

    fn profile_with_everything() -> CandidateProfile {
        CandidateProfile {
            name: Some("Jane Doe".into()),
            email: Some("jane@example.com".into()),
            phone: Some("(555) 123-4567".into()),
            summary: Some("Engineer".into()),
            skills: vec!["rust".into()],
            ..Default::default()
        }
    }

    fn pipeline_with(profile: CandidateProfile) -> ResumePipeline {
        ResumePipeline::new(
            &ProcessingConfig::default(),
            Arc::new(FixedFields { profile }),
        )
    }

    const RESUME_TEXT: &[u8] =
        b"Jane Doe\nSenior Engineer at Acme\nEmail: jane@example.com\nPhone: 555-123-4567\n";

    #[tokio::test]
    async fn test_successful_run_classifies_quality() {
        let pipeline = pipeline_with(profile_with_everything());
        let parsed = pipeline
            .run(RESUME_TEXT, "resume.txt", FileFormat::Txt, RetryStrategy::Standard)
            .await
            .unwrap();

        assert_eq!(parsed.profile.name.as_deref(), Some("Jane Doe"));
        assert_ne!(parsed.quality.tier, QualityTier::Good); // sparse profile
    }

    #[tokio::test]
    async fn test_contact_gaps_filled_from_recoverer() {
        let mut profile = profile_with_everything();
        profile.email = None;
        profile.phone = None;

        let pipeline = pipeline_with(profile);
        let parsed = pipeline
            .run(RESUME_TEXT, "resume.txt", FileFormat::Txt, RetryStrategy::Standard)
            .await
            .unwrap();

        assert_eq!(parsed.profile.email.as_deref(), Some("jane@example.com"));
        assert_eq!(parsed.profile.phone.as_deref(), Some("(555) 123-4567"));
    }

    #[tokio::test]
    async fn test_missing_name_is_a_missing_fields_failure() {
        let mut profile = profile_with_everything();
        profile.name = None;

        let pipeline = pipeline_with(profile);
        let failure = pipeline
            .run(RESUME_TEXT, "resume.txt", FileFormat::Txt, RetryStrategy::Standard)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, crate::error::FailureKind::MissingRequiredFields);
        assert!(failure.message.contains("Name"));
    }

    #[tokio::test]
    async fn test_embedding_runs_alongside_extraction() {
        let pipeline =
            pipeline_with(profile_with_everything()).with_embedder(Arc::new(FixedEmbedder));
        let parsed = pipeline
            .run(RESUME_TEXT, "resume.txt", FileFormat::Txt, RetryStrategy::Standard)
            .await
            .unwrap();

        assert_eq!(parsed.embedding, Some(vec![0.25, 0.5]));
    }

    #[test]
    fn test_contact_zones_cover_header_footer_and_section() {
        let mut lines: Vec<String> = (0..30).map(|i| format!("line {i}")).collect();
        lines.insert(15, "Contact Information".to_string());
        lines.insert(16, "jane@example.com".to_string());
        lines.insert(17, "Experience".to_string());
        let text = lines.join("\n");

        let zones = contact_zones(&text);
        assert_eq!(zones.len(), 3);
        assert!(zones[0].contains("line 0"));
        assert!(zones[1].contains("line 29"));
        assert!(zones[2].contains("jane@example.com"));
        assert!(!zones[2].contains("Experience"));
    }
}
