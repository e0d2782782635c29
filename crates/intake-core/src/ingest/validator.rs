use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;

/// Minimum plausible size for an OLE2 compound document.
const MIN_OLE2_SIZE: usize = 512;

/// Closed set of supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Pdf,
    Docx,
    Doc,
    Txt,
    Rtf,
    Png,
    Jpg,
    Webp,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "doc" => Some(Self::Doc),
            "txt" => Some(Self::Txt),
            "rtf" => Some(Self::Rtf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Sniff a format from leading magic bytes.
    pub fn from_signature(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"%PDF") {
            Some(Self::Pdf)
        } else if data.starts_with(b"PK\x03\x04")
            || data.starts_with(b"PK\x05\x06")
            || data.starts_with(b"PK\x07\x08")
        {
            Some(Self::Docx)
        } else if data.starts_with(&[0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1]) {
            Some(Self::Doc)
        } else if data.starts_with(b"{\\rtf") {
            Some(Self::Rtf)
        } else if data.starts_with(&[0x89, 0x50, 0x4e, 0x47]) {
            Some(Self::Png)
        } else if data.starts_with(&[0xff, 0xd8, 0xff]) {
            Some(Self::Jpg)
        } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Txt => "txt",
            Self::Rtf => "rtf",
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Webp => "webp",
        }
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Jpg | Self::Webp)
    }

    pub const ALL: [Self; 8] = [
        Self::Pdf,
        Self::Docx,
        Self::Doc,
        Self::Txt,
        Self::Rtf,
        Self::Png,
        Self::Jpg,
        Self::Webp,
    ];
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one file. Produced once per file and never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_format: Option<FileFormat>,
    pub is_metadata_file: bool,
    pub is_corrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ValidationResult {
    fn valid(format: FileFormat) -> Self {
        Self {
            is_valid: true,
            detected_format: Some(format),
            is_metadata_file: false,
            is_corrupted: false,
            error_message: None,
        }
    }

    fn rejected(format: Option<FileFormat>, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            detected_format: format,
            is_metadata_file: false,
            is_corrupted: false,
            error_message: Some(message.into()),
        }
    }

    fn corrupted(format: Option<FileFormat>, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            detected_format: format,
            is_metadata_file: false,
            is_corrupted: true,
            error_message: Some(message.into()),
        }
    }

    fn metadata(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            detected_format: None,
            is_metadata_file: true,
            is_corrupted: false,
            error_message: Some(message.into()),
        }
    }
}

/// Sniffs byte signatures and rejects empty, oversized, mislabeled, and
/// metadata files before any extraction work happens.
#[derive(Debug, Clone)]
pub struct FormatValidator {
    limits: LimitsConfig,
}

impl FormatValidator {
    #[must_use]
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn validate(&self, data: &[u8], filename: &str) -> ValidationResult {
        if is_metadata_filename(filename) {
            return ValidationResult::metadata("This is a metadata file, not a resume");
        }

        let claimed = extension(filename).and_then(|ext| FileFormat::from_extension(&ext));

        if data.is_empty() {
            return ValidationResult::corrupted(claimed, "File is empty");
        }

        if data.len() > self.limits.max_file_size {
            return ValidationResult::rejected(
                claimed,
                format!(
                    "File is too large (max {} bytes)",
                    self.limits.max_file_size
                ),
            );
        }

        let Some(format) = claimed else {
            let ext = extension(filename).unwrap_or_default();
            return ValidationResult::rejected(
                None,
                format!("Unsupported file type: .{ext}"),
            );
        };

        if let Some(sniffed) = FileFormat::from_signature(data) {
            if sniffed != format {
                tracing::warn!(
                    filename,
                    claimed = format.as_str(),
                    sniffed = sniffed.as_str(),
                    "file extension does not match content signature",
                );
            }
        }

        match structural_check(data, format) {
            Some(reason) => ValidationResult::corrupted(Some(format), reason),
            None => ValidationResult::valid(format),
        }
    }
}

impl Default for FormatValidator {
    fn default() -> Self {
        Self::new(LimitsConfig::default())
    }
}

fn extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

fn is_metadata_filename(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.ends_with(".json") || lower.ends_with(".meta") || lower.contains("metadata")
}

/// Format-specific sanity check. Returns the corruption reason, if any.
fn structural_check(data: &[u8], format: FileFormat) -> Option<String> {
    match format {
        FileFormat::Pdf => {
            if !data.starts_with(b"%PDF") {
                return Some("Invalid PDF header".to_string());
            }
            if !contains(data, b"%%EOF") {
                return Some("PDF file appears to be incomplete".to_string());
            }
            let head = &data[..data.len().min(1000)];
            if contains(head, &[0, 0, 0, 0]) {
                return Some("PDF file appears to be corrupted".to_string());
            }
            None
        }
        FileFormat::Docx => {
            if !data.starts_with(b"PK") {
                return Some("Invalid DOCX file format".to_string());
            }
            if !contains(data, b"[Content_Types].xml") {
                return Some("DOCX file appears to be corrupted or incomplete".to_string());
            }
            None
        }
        FileFormat::Doc => {
            if !data.starts_with(&[0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1]) {
                return Some("Invalid DOC file format".to_string());
            }
            if data.len() < MIN_OLE2_SIZE {
                return Some("DOC file appears to be too small or corrupted".to_string());
            }
            None
        }
        FileFormat::Txt => {
            let text = String::from_utf8_lossy(data);
            if text.trim().len() < 10 {
                return Some("Text file appears to be empty or too short".to_string());
            }
            None
        }
        FileFormat::Rtf => {
            if !data.starts_with(b"{\\rtf") {
                return Some("Invalid RTF file format".to_string());
            }
            if !data.contains(&b'}') {
                return Some("RTF file appears to be incomplete".to_string());
            }
            None
        }
        FileFormat::Png | FileFormat::Jpg | FileFormat::Webp => {
            if FileFormat::from_signature(data) != Some(format) {
                return Some(format!("Invalid {format} image header"));
            }
            None
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
