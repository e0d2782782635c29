use serde::{Deserialize, Serialize};

/// Values the extraction service uses as stand-ins for "not found".
const PLACEHOLDER_VALUES: &[&str] = &["unknown", "n/a", "none", "null", "-"];

/// Structured candidate record produced by the text-understanding step and
/// enriched by contact recovery.
///
/// Field aliases accept the capitalized keys the extraction service emits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default, alias = "Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "Email", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, alias = "Phone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, alias = "Location", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, alias = "Summary", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, alias = "Skills", skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default, alias = "Experience", skip_serializing_if = "Vec::is_empty")]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default, alias = "Education", skip_serializing_if = "Vec::is_empty")]
    pub education: Vec<EducationEntry>,
    #[serde(default, alias = "Certifications", skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
    #[serde(default, alias = "Languages", skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CandidateProfile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the extraction service returned nothing usable. An empty
    /// profile is treated as a parsing failure, not an empty success.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.populated_field_count() == 0
    }

    /// Number of populated top-level fields, counting each extra key once.
    #[must_use]
    pub fn populated_field_count(&self) -> usize {
        let scalars = [
            &self.name,
            &self.email,
            &self.phone,
            &self.location,
            &self.summary,
        ];
        let scalar_count = scalars
            .iter()
            .filter(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
            .count();

        let list_count = usize::from(!self.skills.is_empty())
            + usize::from(!self.experience.is_empty())
            + usize::from(!self.education.is_empty())
            + usize::from(!self.certifications.is_empty())
            + usize::from(!self.languages.is_empty());

        scalar_count + list_count + self.extra.len()
    }

    /// Essential fields (name/email/phone) that are absent or hold a
    /// placeholder value.
    #[must_use]
    pub fn missing_essentials(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if !is_populated(&self.name) {
            missing.push("Name".to_string());
        }
        if !is_populated(&self.email) {
            missing.push("Email".to_string());
        }
        if !is_populated(&self.phone) {
            missing.push("Phone".to_string());
        }
        missing
    }

    /// Skills lowercased and trimmed, empty entries dropped.
    #[must_use]
    pub fn normalized_skills(&self) -> Vec<String> {
        self.skills
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Fill a missing email/phone from independently recovered contact info.
    pub fn fill_contact_gaps(&mut self, contact: &ContactInfo) {
        if !is_populated(&self.email) {
            if let Some(email) = &contact.email {
                self.email = Some(email.clone());
            }
        }
        if !is_populated(&self.phone) {
            if let Some(phone) = &contact.phone {
                self.phone = Some(phone.clone());
            }
        }
    }
}

fn is_populated(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| {
        let trimmed = s.trim();
        !trimmed.is_empty() && !PLACEHOLDER_VALUES.contains(&trimmed.to_lowercase().as_str())
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    #[serde(default, alias = "Title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, alias = "Company", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, alias = "StartDate", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, alias = "EndDate", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, alias = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    #[serde(default, alias = "Institution", skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(default, alias = "Degree", skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(default, alias = "Field", skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, alias = "Year", skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

/// Which extraction method produced a [`ContactInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    Pattern,
    Context,
    Merged,
    Unknown,
}

impl ContactSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Context => "context",
            Self::Merged => "merged",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContactSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact details recovered from raw text, independent of the structured
/// extraction. Superseded on each retry attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub confidence: f64,
    pub source: ContactSource,
}

impl ContactInfo {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            email: None,
            phone: None,
            confidence: 0.0,
            source: ContactSource::Unknown,
        }
    }

    #[must_use]
    pub fn has_both(&self) -> bool {
        self.email.is_some() && self.phone.is_some()
    }
}

impl Default for ContactInfo {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_profile() {
        let profile = CandidateProfile::new();
        assert!(profile.is_empty());
        assert_eq!(
            profile.missing_essentials(),
            vec!["Name", "Email", "Phone"]
        );
    }

    #[test]
    fn test_placeholder_values_count_as_missing() {
        let profile = CandidateProfile {
            name: Some("Jane Doe".into()),
            email: Some("N/A".into()),
            phone: Some("unknown".into()),
            ..Default::default()
        };

        assert_eq!(profile.missing_essentials(), vec!["Email", "Phone"]);
    }

    #[test]
    fn test_fill_contact_gaps_preserves_existing() {
        let mut profile = CandidateProfile {
            email: Some("jane@example.com".into()),
            ..Default::default()
        };
        let contact = ContactInfo {
            email: Some("other@example.com".into()),
            phone: Some("(555) 123-4567".into()),
            confidence: 0.8,
            source: ContactSource::Pattern,
        };

        profile.fill_contact_gaps(&contact);

        assert_eq!(profile.email.as_deref(), Some("jane@example.com"));
        assert_eq!(profile.phone.as_deref(), Some("(555) 123-4567"));
    }

    #[test]
    fn test_capitalized_aliases_deserialize() {
        let profile: CandidateProfile = serde_json::from_str(
            r#"{"Name": "Jane Doe", "Email": "jane@example.com", "Skills": ["rust", "sql"]}"#,
        )
        .unwrap();

        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
        assert_eq!(profile.skills.len(), 2);
    }

    #[test]
    fn test_populated_field_count() {
        let profile = CandidateProfile {
            name: Some("Jane".into()),
            email: Some("jane@example.com".into()),
            skills: vec!["rust".into()],
            ..Default::default()
        };

        assert_eq!(profile.populated_field_count(), 3);
    }
}
