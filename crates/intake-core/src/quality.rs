use serde::{Deserialize, Serialize};

use crate::candidate::CandidateProfile;
use crate::error::Error;

/// Minimum populated fields before a record is usable at all.
const MIN_POPULATED_FIELDS: usize = 5;

/// Coarse completeness classification of a structured record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Good,
    Partial,
    Poor,
}

impl QualityTier {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Partial => "partial",
            Self::Poor => "poor",
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QualityTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "good" => Ok(Self::Good),
            "partial" => Ok(Self::Partial),
            "poor" => Ok(Self::Poor),
            _ => Err(Error::InvalidQualityTier(s.to_string())),
        }
    }
}

/// Outcome of classifying a structured record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub tier: QualityTier,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_essential: Vec<String>,
    pub populated_fields: usize,
}

/// Deterministic, pure classification of a candidate record.
///
/// Two or more missing essentials is `poor`; one missing essential or two
/// secondary warnings is `partial`; fewer than five populated fields is
/// `poor` regardless.
#[must_use]
pub fn classify(profile: &CandidateProfile) -> QualityReport {
    let missing_essential = profile.missing_essentials();

    let mut warnings = Vec::new();
    if profile.experience.is_empty() {
        warnings.push("missing_experience".to_string());
    }
    if profile.skills.is_empty() {
        warnings.push("missing_skills".to_string());
    }
    if profile.education.is_empty() {
        warnings.push("missing_education".to_string());
    }

    let mut tier = if missing_essential.len() >= 2 {
        QualityTier::Poor
    } else if missing_essential.len() == 1 || warnings.len() >= 2 {
        QualityTier::Partial
    } else {
        QualityTier::Good
    };

    for field in &missing_essential {
        warnings.push(format!("missing_{}", field.to_lowercase()));
    }

    let populated_fields = profile.populated_field_count();
    if populated_fields < MIN_POPULATED_FIELDS {
        tier = QualityTier::Poor;
        warnings.push("insufficient_data".to_string());
    }

    QualityReport {
        tier,
        warnings,
        missing_essential,
        populated_fields,
    }
}
