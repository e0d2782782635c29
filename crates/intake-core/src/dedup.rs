use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateProfile;
use crate::config::DedupConfig;
use crate::error::Result;

/// Read-only, best-effort source of recently ingested records.
#[async_trait::async_trait]
pub trait DuplicateHistorySource: Send + Sync {
    async fn recent(&self, limit: u32) -> Result<Vec<CandidateProfile>>;
}

/// Which field triggered a duplicate rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateField {
    Name,
    Email,
    Phone,
    Skills,
}

impl DuplicateField {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Skills => "skills",
        }
    }
}

impl std::fmt::Display for DuplicateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a duplicate check. Missing fields and duplication are
/// mutually exclusive verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum DuplicateVerdict {
    Unique,
    MissingRequiredFields {
        missing: Vec<String>,
    },
    Duplicate {
        field: DuplicateField,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        similarity: Option<f64>,
    },
}

impl DuplicateVerdict {
    #[must_use]
    pub fn is_unique(&self) -> bool {
        matches!(self, Self::Unique)
    }
}

/// Rejects resubmissions of already-ingested candidates using exact field
/// matches and fuzzy skill overlap against a bounded recent-history sample.
pub struct DuplicateDetector {
    config: DedupConfig,
    history: Arc<dyn DuplicateHistorySource>,
}

impl DuplicateDetector {
    #[must_use]
    pub fn new(config: DedupConfig, history: Arc<dyn DuplicateHistorySource>) -> Self {
        Self { config, history }
    }

    /// Only called on structurally valid, non-empty structured output —
    /// never on raw text.
    pub async fn check(&self, profile: &CandidateProfile) -> DuplicateVerdict {
        let name = normalized(&profile.name);
        let email = normalized(&profile.email);
        let phone = profile.phone.as_deref().map(phone_digits);
        let skills = profile.normalized_skills();

        let mut missing = Vec::new();
        if name.is_none() {
            missing.push("Name".to_string());
        }
        if email.is_none() {
            missing.push("Email".to_string());
        }
        if phone.as_deref().is_none_or(str::is_empty) {
            missing.push("Phone".to_string());
        }
        if skills.is_empty() {
            missing.push("Skills".to_string());
        }
        if !missing.is_empty() {
            return DuplicateVerdict::MissingRequiredFields { missing };
        }

        // Availability over strict prevention: if history cannot be read,
        // let the record through.
        let history = match self.history.recent(self.config.history_limit).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("duplicate history read failed, allowing record through: {e}");
                return DuplicateVerdict::Unique;
            }
        };

        let skill_set: HashSet<String> = skills.into_iter().collect();

        for existing in &history {
            if let (Some(a), Some(b)) = (&name, normalized(&existing.name).as_ref()) {
                if a == b {
                    return DuplicateVerdict::Duplicate {
                        field: DuplicateField::Name,
                        value: a.clone(),
                        similarity: None,
                    };
                }
            }

            if let (Some(a), Some(b)) = (&email, normalized(&existing.email).as_ref()) {
                if a == b {
                    return DuplicateVerdict::Duplicate {
                        field: DuplicateField::Email,
                        value: a.clone(),
                        similarity: None,
                    };
                }
            }

            if let (Some(a), Some(b)) = (
                phone.as_deref(),
                existing.phone.as_deref().map(phone_digits).as_deref(),
            ) {
                if !a.is_empty() && a == b {
                    return DuplicateVerdict::Duplicate {
                        field: DuplicateField::Phone,
                        value: a.to_string(),
                        similarity: None,
                    };
                }
            }

            let existing_skills: HashSet<String> =
                existing.normalized_skills().into_iter().collect();
            if !existing_skills.is_empty() {
                let similarity = jaccard(&skill_set, &existing_skills);
                if similarity >= self.config.skill_similarity_threshold {
                    return DuplicateVerdict::Duplicate {
                        field: DuplicateField::Skills,
                        value: format!("{:.0}% overlap", similarity * 100.0),
                        similarity: Some(similarity),
                    };
                }
            }
        }

        DuplicateVerdict::Unique
    }
}

fn normalized(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Jaccard similarity of two sets: |A ∩ B| / |A ∪ B|.
#[must_use]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}
