use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::NormalizerConfig;

/// How aggressively to clean extracted text.
///
/// `Strict` is the EnhancedPreprocessing retry mode: on top of the standard
/// passes it repairs common OCR confusions and de-obfuscates contact
/// patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMode {
    Standard,
    Strict,
}

/// Statistics about one normalization pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub original_len: usize,
    pub normalized_len: usize,
    pub lines_dropped: usize,
    pub truncated: bool,
}

/// Cleans extracted text: OCR artifacts, repeated headers/footers,
/// page-number noise, runaway character runs, and size.
///
/// Pure with respect to its inputs and never fails; the worst case is
/// returning the input unchanged.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    config: NormalizerConfig,
}

impl TextNormalizer {
    #[must_use]
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn normalize(&self, text: &str, mode: NormalizeMode) -> (String, NormalizeStats) {
        let original_len = text.len();

        let mut lines_dropped = 0usize;
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept: Vec<String> = Vec::new();

        for raw_line in text.lines() {
            let line = collapse_whitespace(&strip_non_printable(raw_line));
            if line.is_empty() {
                continue;
            }
            if is_page_number(&line) || is_low_entropy(&line) {
                lines_dropped += 1;
                continue;
            }

            // Deduplicate verbatim-recurring lines (header/footer artifacts),
            // keeping the first occurrence in original order.
            let key = line.to_lowercase();
            if !seen.insert(key) {
                lines_dropped += 1;
                continue;
            }

            kept.push(line);
        }

        let mut normalized = kept.join("\n");
        normalized = collapse_repeats(&normalized);

        if mode == NormalizeMode::Strict {
            normalized = deobfuscate_contacts(&normalized);
            normalized = fix_ocr_confusions(&normalized);
        }

        let mut truncated = false;
        if normalized.chars().count() > self.config.max_chars {
            normalized = normalized.chars().take(self.config.max_chars).collect();
            truncated = true;
            tracing::warn!(
                max_chars = self.config.max_chars,
                "normalized text truncated to character budget",
            );
        }

        if normalized.trim().is_empty() {
            // Everything was filtered out; fall back to the raw input.
            normalized = text.to_string();
        }

        let stats = NormalizeStats {
            original_len,
            normalized_len: normalized.len(),
            lines_dropped,
            truncated,
        };

        (normalized, stats)
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

fn strip_non_printable(line: &str) -> String {
    line.chars()
        .map(|c| {
            if c.is_control() && c != '\t' {
                ' '
            } else {
                c
            }
        })
        .collect()
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Standalone short numbers are page-number noise.
fn is_page_number(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() <= 3 && !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit())
}

/// Long lines drawn from one or two distinct characters are separators,
/// not content.
fn is_low_entropy(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() <= 5 {
        return false;
    }
    let distinct: HashSet<char> = trimmed.chars().collect();
    distinct.len() <= 2
}

/// Collapse runs of 3+ identical characters down to two.
fn collapse_repeats(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last: Option<char> = None;
    let mut run = 0usize;

    for c in text.chars() {
        if Some(c) == last {
            run += 1;
        } else {
            last = Some(c);
            run = 1;
        }
        if run <= 2 {
            out.push(c);
        }
    }

    out
}

/// Rewrite spelled-out contact separators ("jane at example dot com").
fn deobfuscate_contacts(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let replaced = line
            .replace(" at ", "@")
            .replace(" AT ", "@")
            .replace(" dot ", ".")
            .replace(" DOT ", ".");
        out.push_str(&replaced);
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}

/// Repair character confusions OCR produces inside words.
fn fix_ocr_confusions(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            line.split(' ')
                .map(fix_word)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fix_word(word: &str) -> String {
    // Only touch words that are mostly alphabetic; numbers stay intact.
    let alpha = word.chars().filter(|c| c.is_alphabetic()).count();
    let digits = word.chars().filter(|c| c.is_ascii_digit()).count();
    if digits == 0 || alpha < digits {
        return word.to_string();
    }

    word.chars()
        .map(|c| match c {
            '0' => 'O',
            '1' => 'l',
            '5' => 'S',
            '8' => 'B',
            '|' => 'I',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_and_drops_blank_lines() {
        let normalizer = TextNormalizer::default();
        let (out, _) = normalizer.normalize("a   b\n\n\n  c  d  ", NormalizeMode::Standard);
        assert_eq!(out, "a b\nc d");
    }

    #[test]
    fn test_drops_page_numbers_and_separators() {
        let normalizer = TextNormalizer::default();
        let text = "Jane Doe\n12\n--------\nSoftware Engineer";
        let (out, stats) = normalizer.normalize(text, NormalizeMode::Standard);

        assert_eq!(out, "Jane Doe\nSoftware Engineer");
        assert_eq!(stats.lines_dropped, 2);
    }

    #[test]
    fn test_dedupes_recurring_lines_preserving_order() {
        let normalizer = TextNormalizer::default();
        let text = "Jane Doe\nExperience\nAcme Corp\nJane Doe\nEducation\nJane Doe";
        let (out, _) = normalizer.normalize(text, NormalizeMode::Standard);

        assert_eq!(out, "Jane Doe\nExperience\nAcme Corp\nEducation");
    }

    #[test]
    fn test_collapses_repeated_characters() {
        let normalizer = TextNormalizer::default();
        let (out, _) = normalizer.normalize("helloooooo world", NormalizeMode::Standard);
        assert_eq!(out, "helloo world");
    }

    #[test]
    fn test_truncates_to_budget_with_flag() {
        let normalizer = TextNormalizer::new(NormalizerConfig { max_chars: 10 });
        let (out, stats) =
            normalizer.normalize("word1 word2 word3 word4", NormalizeMode::Standard);

        assert_eq!(out.chars().count(), 10);
        assert!(stats.truncated);
    }

    #[test]
    fn test_strict_mode_deobfuscates_email() {
        let normalizer = TextNormalizer::default();
        let (out, _) = normalizer.normalize(
            "reachable via jane at example dot com here",
            NormalizeMode::Strict,
        );

        assert!(out.contains("jane@example.com"), "got: {out}");
    }

    #[test]
    fn test_strict_mode_fixes_ocr_digits_in_words() {
        let normalizer = TextNormalizer::default();
        let (out, _) = normalizer.normalize("S0ftware Engineer", NormalizeMode::Strict);
        assert!(out.contains("SOftware"), "got: {out}");
    }

    #[test]
    fn test_never_fails_on_hostile_input() {
        let normalizer = TextNormalizer::default();
        let (out, _) = normalizer.normalize("\u{0}\u{1}\u{2}", NormalizeMode::Standard);
        // Worst case: the input comes back unchanged.
        assert!(!out.is_empty());
    }

    #[test]
    fn test_phone_numbers_survive_strict_mode() {
        let normalizer = TextNormalizer::default();
        let (out, _) = normalizer.normalize("call 555-123-4567 now", NormalizeMode::Strict);
        assert!(out.contains("555-123-4567"));
    }
}
