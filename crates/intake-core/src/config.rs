use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the whole pipeline, grouped per concern.
///
/// Several thresholds here (sparse-text floor, skill-overlap cutoff, the
/// retry bound) are empirically tuned values carried as configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub limits: LimitsConfig,
    pub ocr: OcrConfig,
    pub normalizer: NormalizerConfig,
    pub retry: RetryConfig,
    pub dedup: DedupConfig,
    pub bulk: BulkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Hard ceiling on accepted file size, in bytes.
    pub max_file_size: usize,
    /// Extraction output below this length is a hard failure.
    pub min_text_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            min_text_length: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    /// Direct extraction shorter than this triggers the OCR fallback.
    pub sparse_text_threshold: usize,
    /// Spans below this confidence are discarded.
    pub confidence_threshold: f64,
    /// Leading pages rendered for the sparse-text fallback.
    pub max_pages: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sparse_text_threshold: 100,
            confidence_threshold: 0.5,
            max_pages: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Character budget for normalized text handed to the extraction service.
    pub max_chars: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { max_chars: 40_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt; the attempt log never exceeds
    /// `max_retries + 1` entries.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Recent-history sample size consulted per candidate.
    pub history_limit: u32,
    /// Jaccard similarity at or above which skill sets count as duplicates.
    pub skill_similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            history_limit: 500,
            skill_similarity_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Worker-pool size; a hard admission-control limit, not advisory.
    pub max_concurrency: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProcessingConfig::default();
        assert_eq!(config.ocr.sparse_text_threshold, 100);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.dedup.history_limit, 500);
        assert!((config.dedup.skill_similarity_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.bulk.max_concurrency, 10);
    }

    #[test]
    fn test_partial_overrides_deserialize() {
        let config: ProcessingConfig =
            serde_json::from_str(r#"{"retry": {"max_retries": 1}}"#).unwrap();
        assert_eq!(config.retry.max_retries, 1);
        // Untouched sections keep their defaults.
        assert_eq!(config.ocr.max_pages, 3);
    }
}
