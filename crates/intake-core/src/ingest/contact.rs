use regex::Regex;

use crate::candidate::{ContactInfo, ContactSource};

const EMAIL_PATTERNS: &[&str] = &[
    // Standard address
    r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
    // Spelled-out separators, common in scraped resumes
    r"(?i)\b[A-Za-z0-9._%+-]+\s+at\s+[A-Za-z0-9.-]+\s+dot\s+[A-Za-z]{2,}\b",
    // Spaces crept in around the separators
    r"\b[A-Za-z0-9._%+-]+\s*@\s*[A-Za-z0-9.-]+\s*\.\s*[A-Za-z]{2,}\b",
    // Wrapped in parentheses or brackets
    r"\([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\)",
    r"\[[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\]",
];

const PHONE_PATTERNS: &[&str] = &[
    // US layouts with optional country code
    r"\+?1?[-.\s]?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}",
    r"\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}",
    // Bare international
    r"\+[1-9][0-9]{7,14}",
];

const EMAIL_KEYWORDS: &[&str] = &["email", "e-mail", "mail", "contact", "reach me"];
const PHONE_KEYWORDS: &[&str] = &[
    "phone", "tel", "telephone", "mobile", "cell", "call me",
];

/// Recovers contact details from raw text via two independent methods and
/// merges the results by confidence and agreement.
///
/// Never fails: absent contact info is a valid outcome, consumed downstream
/// by field validation.
#[derive(Debug)]
pub struct ContactRecoverer {
    email_patterns: Vec<Regex>,
    phone_patterns: Vec<Regex>,
}

impl ContactRecoverer {
    #[must_use]
    pub fn new() -> Self {
        let mut email_patterns = Vec::new();
        for pattern in EMAIL_PATTERNS {
            if let Ok(re) = Regex::new(pattern) {
                email_patterns.push(re);
            }
        }

        let mut phone_patterns = Vec::new();
        for pattern in PHONE_PATTERNS {
            if let Ok(re) = Regex::new(pattern) {
                phone_patterns.push(re);
            }
        }

        Self {
            email_patterns,
            phone_patterns,
        }
    }

    #[must_use]
    pub fn recover(&self, text: &str) -> ContactInfo {
        let pattern_result = self.extract_with_patterns(text);
        let context_result = self.extract_with_context(text);
        merge(pattern_result, context_result)
    }

    /// First match per field across the ordered pattern list wins.
    fn extract_with_patterns(&self, text: &str) -> ContactInfo {
        let email = self.find_email(text);
        let phone = self.find_phone(text);

        let confidence = match (&email, &phone) {
            (Some(_), Some(_)) => 0.8,
            (Some(_), None) | (None, Some(_)) => 0.6,
            (None, None) => 0.0,
        };

        ContactInfo {
            email,
            phone,
            confidence,
            source: ContactSource::Pattern,
        }
    }

    /// Re-runs the same patterns scoped to lines carrying contact cues;
    /// trusted more than the blind pattern pass.
    fn extract_with_context(&self, text: &str) -> ContactInfo {
        let mut email = None;
        let mut phone = None;

        for line in text.lines() {
            let lower = line.to_lowercase();

            if email.is_none() && EMAIL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                email = self.find_email(line);
            }
            if phone.is_none() && PHONE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                phone = self.find_phone(line);
            }
            if email.is_some() && phone.is_some() {
                break;
            }
        }

        let confidence = match (&email, &phone) {
            (Some(_), Some(_)) => 0.9,
            (Some(_), None) | (None, Some(_)) => 0.7,
            (None, None) => 0.0,
        };

        ContactInfo {
            email,
            phone,
            confidence,
            source: ContactSource::Context,
        }
    }

    fn find_email(&self, text: &str) -> Option<String> {
        for re in &self.email_patterns {
            if let Some(found) = re.find(text) {
                return Some(normalize_email(found.as_str()));
            }
        }
        None
    }

    fn find_phone(&self, text: &str) -> Option<String> {
        for re in &self.phone_patterns {
            if let Some(found) = re.find(text) {
                return Some(normalize_phone(found.as_str()));
            }
        }
        None
    }
}

impl Default for ContactRecoverer {
    fn default() -> Self {
        Self::new()
    }
}

/// Context wins; pattern fills gaps; agreement on the same value adds +0.1
/// confidence, capped at 1.0.
fn merge(pattern: ContactInfo, context: ContactInfo) -> ContactInfo {
    let email = context.email.clone().or_else(|| pattern.email.clone());
    let phone = context.phone.clone().or_else(|| pattern.phone.clone());

    let mut confidence = pattern.confidence.max(context.confidence);
    if context.email.is_some() && context.email == pattern.email {
        confidence = (confidence + 0.1).min(1.0);
    }
    if context.phone.is_some() && context.phone == pattern.phone {
        confidence = (confidence + 0.1).min(1.0);
    }

    let source = if context.email.is_some() || context.phone.is_some() {
        if pattern.email.is_some() || pattern.phone.is_some() {
            ContactSource::Merged
        } else {
            ContactSource::Context
        }
    } else if pattern.email.is_some() || pattern.phone.is_some() {
        ContactSource::Pattern
    } else {
        ContactSource::Unknown
    };

    ContactInfo {
        email,
        phone,
        confidence,
        source,
    }
}

fn normalize_email(raw: &str) -> String {
    let mut email = raw.trim().to_lowercase();
    email = email.replace(" at ", "@").replace(" dot ", ".");
    email.retain(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']'));
    email
}

fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let plus = raw.trim_start().starts_with('+');

    if digits.len() == 10 {
        format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
    } else if digits.len() == 11 && digits.starts_with('1') {
        format!("+1 ({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..])
    } else if plus {
        format!("+{digits}")
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_extraction_finds_both() {
        let recoverer = ContactRecoverer::new();
        let info = recoverer.recover("Jane Doe\njane.doe@example.com\n555-123-4567\n");

        assert_eq!(info.email.as_deref(), Some("jane.doe@example.com"));
        assert_eq!(info.phone.as_deref(), Some("(555) 123-4567"));
        assert!(info.confidence >= 0.8);
    }

    #[test]
    fn test_obfuscated_email_is_normalized() {
        let recoverer = ContactRecoverer::new();
        let info = recoverer.recover("write to jane at example dot com for details");

        assert_eq!(info.email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn test_context_lines_raise_confidence() {
        let recoverer = ContactRecoverer::new();
        let info = recoverer.recover("Email: jane@example.com\nPhone: (555) 123-4567");

        // Both methods find the same values: 0.9 context + 0.1 + 0.1 agreement.
        assert!(info.confidence > 0.99, "confidence was {}", info.confidence);
        assert_eq!(info.source, ContactSource::Merged);
    }

    #[test]
    fn test_agreement_bonus_is_capped() {
        let recoverer = ContactRecoverer::new();
        let info = recoverer.recover("Email: a@b.co\nPhone: 555-123-4567\n");

        assert!(info.confidence <= 1.0);
    }

    #[test]
    fn test_absence_is_a_valid_outcome() {
        let recoverer = ContactRecoverer::new();
        let info = recoverer.recover("no way to reach this candidate");

        assert!(info.email.is_none());
        assert!(info.phone.is_none());
        assert!((info.confidence - 0.0).abs() < f64::EPSILON);
        assert_eq!(info.source, ContactSource::Unknown);
    }

    #[test]
    fn test_us_phone_with_country_code() {
        let recoverer = ContactRecoverer::new();
        let info = recoverer.recover("cell +1 (555) 123-4567");

        assert_eq!(info.phone.as_deref(), Some("+1 (555) 123-4567"));
    }

    #[test]
    fn test_bracketed_email() {
        let recoverer = ContactRecoverer::new();
        let info = recoverer.recover("contact [jane@example.com] today");

        assert_eq!(info.email.as_deref(), Some("jane@example.com"));
    }
}
