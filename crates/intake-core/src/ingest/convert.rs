use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;

use crate::ocr::{join_confident_spans, OcrEngine, PdfBackend};

/// A converted result shorter than this is treated as garbage.
const MIN_CONVERTED_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Converter unavailable: {0}")]
    Unavailable(String),
    #[error("Conversion produced no usable text")]
    NoText,
    #[error("Conversion failed: {0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConvertResult<T> = Result<T, ConvertError>;

/// One way of turning a legacy binary document into text. Implementations
/// wrap host tools and are skipped, not failed, when the tool is missing.
#[async_trait::async_trait]
pub trait LegacyConverter: Send + Sync {
    fn name(&self) -> &'static str;

    fn available(&self) -> bool;

    async fn extract(&self, data: &[u8]) -> ConvertResult<String>;
}

/// Ordered fallback chain over optional converters: the first available
/// converter whose output clears the length floor wins, and the chain
/// degrades gracefully to raw byte decoding.
pub struct ConverterChain {
    converters: Vec<Arc<dyn LegacyConverter>>,
}

impl ConverterChain {
    #[must_use]
    pub fn new(converters: Vec<Arc<dyn LegacyConverter>>) -> Self {
        Self { converters }
    }

    /// The production chain, in preference order.
    #[must_use]
    pub fn standard(
        pdf: Arc<dyn PdfBackend>,
        ocr: Option<Arc<dyn OcrEngine>>,
        ocr_confidence: f64,
        ocr_max_pages: u32,
    ) -> Self {
        Self::new(vec![
            Arc::new(Antiword),
            Arc::new(SofficeToDocx),
            Arc::new(Pandoc),
            Arc::new(SofficeToPdf {
                pdf,
                ocr,
                ocr_confidence,
                ocr_max_pages,
            }),
        ])
    }

    /// Try each converter in order; fall through to byte decoding if none
    /// produces usable text.
    pub async fn extract(&self, data: &[u8]) -> String {
        for converter in &self.converters {
            if !converter.available() {
                tracing::debug!(converter = converter.name(), "converter not available, skipping");
                continue;
            }

            match converter.extract(data).await {
                Ok(text) if text.trim().len() >= MIN_CONVERTED_LEN => {
                    tracing::info!(
                        converter = converter.name(),
                        chars = text.len(),
                        "legacy document converted",
                    );
                    return text;
                }
                Ok(_) => {
                    tracing::debug!(converter = converter.name(), "converter output below floor");
                }
                Err(e) => {
                    tracing::warn!(converter = converter.name(), "converter error: {e}");
                }
            }
        }

        tracing::warn!("all converters exhausted, falling back to byte decoding");
        decode_bytes(data)
    }
}

/// Absolute last resort: strip the printable ASCII out of the raw bytes.
#[must_use]
pub fn decode_bytes(data: &[u8]) -> String {
    let text: String = data
        .iter()
        .map(|&b| {
            if (0x20..=0x7e).contains(&b) || b == b'\n' || b == b'\r' || b == b'\t' {
                b as char
            } else {
                ' '
            }
        })
        .collect();

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

async fn write_temp_doc(dir: &Path, data: &[u8]) -> ConvertResult<std::path::PathBuf> {
    let input = dir.join("input.doc");
    tokio::fs::write(&input, data).await?;
    Ok(input)
}

/// antiword: cleanest plain text for legacy .doc files.
pub struct Antiword;

#[async_trait::async_trait]
impl LegacyConverter for Antiword {
    fn name(&self) -> &'static str {
        "antiword"
    }

    fn available(&self) -> bool {
        which::which("antiword").is_ok()
    }

    async fn extract(&self, data: &[u8]) -> ConvertResult<String> {
        let dir = tempfile::tempdir()?;
        let input = write_temp_doc(dir.path(), data).await?;

        let output = Command::new("antiword")
            .arg("-m")
            .arg("UTF-8.txt")
            .arg(&input)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ConvertError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(ConvertError::NoText);
        }
        Ok(text)
    }
}

fn soffice_binary() -> Option<&'static str> {
    for name in ["soffice", "libreoffice"] {
        if which::which(name).is_ok() {
            return Some(name);
        }
    }
    None
}

/// LibreOffice DOC -> DOCX, then re-use the container extractor.
pub struct SofficeToDocx;

#[async_trait::async_trait]
impl LegacyConverter for SofficeToDocx {
    fn name(&self) -> &'static str {
        "soffice->docx"
    }

    fn available(&self) -> bool {
        soffice_binary().is_some()
    }

    async fn extract(&self, data: &[u8]) -> ConvertResult<String> {
        let binary = soffice_binary()
            .ok_or_else(|| ConvertError::Unavailable("libreoffice".to_string()))?;
        let dir = tempfile::tempdir()?;
        let input = write_temp_doc(dir.path(), data).await?;

        let output = Command::new(binary)
            .arg("--headless")
            .arg("--convert-to")
            .arg("docx")
            .arg("--outdir")
            .arg(dir.path())
            .arg(&input)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ConvertError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let converted = dir.path().join("input.docx");
        let bytes = tokio::fs::read(&converted).await?;
        super::extractor::extract_docx_text(&bytes)
            .map_err(|e| ConvertError::Failed(e.to_string()))
    }
}

/// pandoc DOC -> plain text.
pub struct Pandoc;

#[async_trait::async_trait]
impl LegacyConverter for Pandoc {
    fn name(&self) -> &'static str {
        "pandoc"
    }

    fn available(&self) -> bool {
        which::which("pandoc").is_ok()
    }

    async fn extract(&self, data: &[u8]) -> ConvertResult<String> {
        let dir = tempfile::tempdir()?;
        let input = write_temp_doc(dir.path(), data).await?;

        let output = Command::new("pandoc")
            .arg(&input)
            .arg("-t")
            .arg("plain")
            .output()
            .await?;

        if !output.status.success() {
            return Err(ConvertError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(ConvertError::NoText);
        }
        Ok(text)
    }
}

/// LibreOffice DOC -> PDF, then the PDF text layer; OCR on rendered pages
/// when the text layer comes back empty.
pub struct SofficeToPdf {
    pub pdf: Arc<dyn PdfBackend>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub ocr_confidence: f64,
    pub ocr_max_pages: u32,
}

#[async_trait::async_trait]
impl LegacyConverter for SofficeToPdf {
    fn name(&self) -> &'static str {
        "soffice->pdf"
    }

    fn available(&self) -> bool {
        soffice_binary().is_some()
    }

    async fn extract(&self, data: &[u8]) -> ConvertResult<String> {
        let binary = soffice_binary()
            .ok_or_else(|| ConvertError::Unavailable("libreoffice".to_string()))?;
        let dir = tempfile::tempdir()?;
        let input = write_temp_doc(dir.path(), data).await?;

        let output = Command::new(binary)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(dir.path())
            .arg(&input)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ConvertError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let pdf_bytes = tokio::fs::read(dir.path().join("input.pdf")).await?;

        if let Ok(text) = self.pdf.extract_text(&pdf_bytes).await {
            if text.trim().len() >= MIN_CONVERTED_LEN {
                return Ok(text);
            }
        }

        let Some(ocr) = &self.ocr else {
            return Err(ConvertError::NoText);
        };

        let pages = self
            .pdf
            .render_pages(&pdf_bytes, self.ocr_max_pages)
            .await
            .map_err(|e| ConvertError::Failed(e.to_string()))?;

        let mut chunks = Vec::new();
        for page in &pages {
            match ocr.recognize(page, "png").await {
                Ok(spans) => {
                    let text = join_confident_spans(&spans, self.ocr_confidence);
                    if !text.is_empty() {
                        chunks.push(text);
                    }
                }
                Err(e) => tracing::warn!("OCR on rendered page failed: {e}"),
            }
        }

        let text = chunks.join("\n");
        if text.trim().is_empty() {
            return Err(ConvertError::NoText);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Missing;

    #[async_trait::async_trait]
    impl LegacyConverter for Missing {
        fn name(&self) -> &'static str {
            "missing"
        }
        fn available(&self) -> bool {
            false
        }
        async fn extract(&self, _data: &[u8]) -> ConvertResult<String> {
            Err(ConvertError::Unavailable("missing".to_string()))
        }
    }

    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl LegacyConverter for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn available(&self) -> bool {
            true
        }
        async fn extract(&self, _data: &[u8]) -> ConvertResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_first_success_over_floor_wins() {
        let chain = ConverterChain::new(vec![
            Arc::new(Missing),
            Arc::new(Fixed("too short")),
            Arc::new(Fixed("this output is comfortably long enough")),
        ]);

        let text = chain.extract(b"anything").await;
        assert_eq!(text, "this output is comfortably long enough");
    }

    #[tokio::test]
    async fn test_empty_chain_falls_back_to_byte_decoding() {
        let chain = ConverterChain::new(vec![]);
        let mut data = vec![0xd0, 0xcf, 0x11, 0xe0];
        data.extend_from_slice(b"Jane Doe Senior Engineer jane@example.com");
        data.extend_from_slice(&[0x00, 0x01, 0x02]);

        let text = chain.extract(&data).await;
        assert!(text.contains("Jane Doe Senior Engineer"));
        assert!(!text.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_converters_are_skipped_not_fatal() {
        let chain = ConverterChain::new(vec![Arc::new(Missing), Arc::new(Missing)]);
        let text = chain.extract(b"plain readable fallback content").await;
        assert!(text.contains("plain readable fallback content"));
    }

    #[test]
    fn test_decode_bytes_strips_binary_noise() {
        let data = b"\x00\x01Hello\xffWorld\x02";
        assert_eq!(decode_bytes(data), "Hello World");
    }
}
