use std::io::Read;
use std::sync::Arc;

use thiserror::Error;

use super::convert::{decode_bytes, ConverterChain};
use super::validator::FileFormat;
use crate::config::{LimitsConfig, OcrConfig};
use crate::ocr::{join_confident_spans, OcrEngine, PdfBackend};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("No meaningful text content found")]
    NoText,
    #[error("No OCR engine available for image input")]
    OcrUnavailable,
    #[error("Unreadable container: {0}")]
    Container(String),
    #[error("Extraction failed: {0}")]
    Failed(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Multi-strategy text extraction: native text layers where they exist, OCR
/// for rasters and sparse documents, and a converter fallback chain for
/// legacy binaries.
pub struct TextExtractor {
    limits: LimitsConfig,
    ocr_config: OcrConfig,
    ocr: Option<Arc<dyn OcrEngine>>,
    pdf: Arc<dyn PdfBackend>,
    legacy_chain: ConverterChain,
}

impl TextExtractor {
    #[must_use]
    pub fn new(
        limits: LimitsConfig,
        ocr_config: OcrConfig,
        pdf: Arc<dyn PdfBackend>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> Self {
        let ocr = if ocr_config.enabled { ocr } else { None };
        let legacy_chain = ConverterChain::standard(
            Arc::clone(&pdf),
            ocr.clone(),
            ocr_config.confidence_threshold,
            ocr_config.max_pages,
        );

        Self {
            limits,
            ocr_config,
            ocr,
            pdf,
            legacy_chain,
        }
    }

    /// Replace the legacy-document fallback chain (tests, constrained hosts).
    #[must_use]
    pub fn with_legacy_chain(mut self, chain: ConverterChain) -> Self {
        self.legacy_chain = chain;
        self
    }

    pub async fn extract(&self, data: &[u8], format: FileFormat) -> ExtractionResult<String> {
        let text = match format {
            FileFormat::Txt => extract_plain_text(data),
            FileFormat::Rtf => strip_rtf(&String::from_utf8_lossy(data)),
            FileFormat::Docx => extract_docx_text(data)?,
            FileFormat::Pdf => self.extract_pdf(data).await?,
            FileFormat::Doc => self.legacy_chain.extract(data).await,
            FileFormat::Png | FileFormat::Jpg | FileFormat::Webp => {
                self.extract_image(data, format).await?
            }
        };

        if text.trim().len() < self.limits.min_text_length {
            return Err(ExtractionError::NoText);
        }

        Ok(text)
    }

    /// Native text layer first; if the result is sparse, OCR a bounded
    /// number of leading pages and keep whichever candidate is longer.
    async fn extract_pdf(&self, data: &[u8]) -> ExtractionResult<String> {
        let direct = match self.pdf.extract_text(data).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!("PDF text layer extraction failed: {e}");
                String::new()
            }
        };

        if direct.len() >= self.ocr_config.sparse_text_threshold {
            return Ok(direct);
        }

        let Some(ocr) = &self.ocr else {
            tracing::warn!(
                chars = direct.len(),
                "PDF text is sparse and no OCR engine is available",
            );
            return if direct.is_empty() {
                Err(ExtractionError::NoText)
            } else {
                Ok(direct)
            };
        };

        tracing::info!(
            chars = direct.len(),
            threshold = self.ocr_config.sparse_text_threshold,
            "PDF text is sparse, attempting OCR on leading pages",
        );

        let ocr_text = match self.ocr_pages(data, ocr).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("OCR fallback failed: {e}");
                String::new()
            }
        };

        if ocr_text.trim().len() > direct.len() {
            Ok(ocr_text)
        } else if direct.is_empty() {
            Err(ExtractionError::NoText)
        } else {
            Ok(direct)
        }
    }

    async fn ocr_pages(
        &self,
        data: &[u8],
        ocr: &Arc<dyn OcrEngine>,
    ) -> ExtractionResult<String> {
        let pages = self
            .pdf
            .render_pages(data, self.ocr_config.max_pages)
            .await
            .map_err(|e| ExtractionError::Failed(e.to_string()))?;

        let mut chunks = Vec::new();
        for (index, page) in pages.iter().enumerate() {
            match ocr.recognize(page, "png").await {
                Ok(spans) => {
                    let text =
                        join_confident_spans(&spans, self.ocr_config.confidence_threshold);
                    if !text.is_empty() {
                        chunks.push(text);
                    }
                }
                Err(e) => {
                    tracing::warn!(page = index + 1, "OCR failed on page: {e}");
                }
            }
        }

        Ok(chunks.join("\n"))
    }

    async fn extract_image(
        &self,
        data: &[u8],
        format: FileFormat,
    ) -> ExtractionResult<String> {
        let Some(ocr) = &self.ocr else {
            return Err(ExtractionError::OcrUnavailable);
        };

        let spans = ocr
            .recognize(data, format.as_str())
            .await
            .map_err(|e| ExtractionError::Failed(e.to_string()))?;

        let text = join_confident_spans(&spans, self.ocr_config.confidence_threshold);
        if text.trim().is_empty() {
            return Err(ExtractionError::NoText);
        }
        Ok(text)
    }
}

fn extract_plain_text(data: &[u8]) -> String {
    match String::from_utf8(data.to_vec()) {
        Ok(text) => text.trim().to_string(),
        // Not UTF-8; degrade through the byte decoder rather than failing.
        Err(_) => decode_bytes(data),
    }
}

/// Pull the document body out of a DOCX container and flatten it to
/// paragraph-per-line text.
pub fn extract_docx_text(data: &[u8]) -> ExtractionResult<String> {
    let cursor = std::io::Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| ExtractionError::Container(e.to_string()))?;

    let mut document = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractionError::Container(e.to_string()))?
        .read_to_string(&mut document)
        .map_err(|e| ExtractionError::Container(e.to_string()))?;

    Ok(strip_document_xml(&document))
}

/// Paragraph close tags become newlines; every other tag is dropped.
fn strip_document_xml(xml: &str) -> String {
    let with_breaks = xml.replace("</w:p>", "\n");

    let mut out = String::with_capacity(with_breaks.len());
    let mut in_tag = false;
    for c in with_breaks.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Minimal RTF to text: drop control words, groups, and hex escapes.
fn strip_rtf(rtf: &str) -> String {
    let mut out = String::with_capacity(rtf.len());
    let mut chars = rtf.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' | '}' => {}
            '\\' => {
                match chars.peek() {
                    // Escaped literal
                    Some('\\' | '{' | '}') => {
                        if let Some(literal) = chars.next() {
                            out.push(literal);
                        }
                    }
                    // Hex escape: \'xx
                    Some('\'') => {
                        chars.next();
                        chars.next();
                        chars.next();
                        out.push(' ');
                    }
                    _ => {
                        // Control word: consume letters plus optional numeric
                        // argument and one trailing space.
                        let mut word = String::new();
                        while let Some(&next) = chars.peek() {
                            if next.is_ascii_alphabetic() {
                                word.push(next);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        while let Some(&next) = chars.peek() {
                            if next.is_ascii_digit() || next == '-' {
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        if chars.peek() == Some(&' ') {
                            chars.next();
                        }
                        if word == "par" || word == "line" {
                            out.push('\n');
                        }
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{OcrError, OcrResult, OcrSpan};
    use std::io::Write;

    struct FakePdf {
        text: String,
        pages: usize,
    }

    #[async_trait::async_trait]
    impl PdfBackend for FakePdf {
        async fn extract_text(&self, _data: &[u8]) -> OcrResult<String> {
            Ok(self.text.clone())
        }

        async fn render_pages(&self, _data: &[u8], max_pages: u32) -> OcrResult<Vec<Vec<u8>>> {
            Ok(vec![vec![0u8; 4]; self.pages.min(max_pages as usize)])
        }
    }

    struct FakeOcr {
        spans: Vec<OcrSpan>,
    }

    #[async_trait::async_trait]
    impl OcrEngine for FakeOcr {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn available(&self) -> bool {
            true
        }
        async fn recognize(&self, _image: &[u8], _ext: &str) -> OcrResult<Vec<OcrSpan>> {
            Ok(self.spans.clone())
        }
    }

    struct FailingOcr;

    #[async_trait::async_trait]
    impl OcrEngine for FailingOcr {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn available(&self) -> bool {
            true
        }
        async fn recognize(&self, _image: &[u8], _ext: &str) -> OcrResult<Vec<OcrSpan>> {
            Err(OcrError::Failed("boom".to_string()))
        }
    }

    fn extractor(
        pdf_text: &str,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> TextExtractor {
        TextExtractor::new(
            LimitsConfig::default(),
            OcrConfig::default(),
            Arc::new(FakePdf {
                text: pdf_text.to_string(),
                pages: 1,
            }),
            ocr,
        )
    }

    fn spans_for(words: &str) -> Vec<OcrSpan> {
        words
            .split_whitespace()
            .map(|w| OcrSpan {
                text: w.to_string(),
                confidence: 0.9,
            })
            .collect()
    }

    fn docx_bytes(body: &str) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer
                .start_file("[Content_Types].xml", options)
                .unwrap();
            writer.write_all(b"<Types/>").unwrap();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[tokio::test]
    async fn test_plain_text_extraction() {
        let ex = extractor("", None);
        let text = ex
            .extract(b"Jane Doe, Software Engineer", FileFormat::Txt)
            .await
            .unwrap();
        assert_eq!(text, "Jane Doe, Software Engineer");
    }

    #[tokio::test]
    async fn test_sparse_pdf_prefers_longer_ocr_output() {
        // 40 chars of direct text, below the 100-char sparse threshold.
        let direct = "Jane Doe jane@example.com 555-123-4567!";
        let ocr_words = "Jane Doe Senior Software Engineer jane at example dot com phone \
                         five five five one two three four five six seven with much more \
                         recovered detail than the native layer";
        let ex = extractor(
            direct,
            Some(Arc::new(FakeOcr {
                spans: spans_for(ocr_words),
            })),
        );

        let text = ex.extract(b"%PDF-1.4", FileFormat::Pdf).await.unwrap();
        assert!(text.len() > direct.len());
        assert!(text.contains("recovered detail"));
    }

    #[tokio::test]
    async fn test_rich_pdf_skips_ocr() {
        let direct = "x".repeat(500);
        let ex = extractor(
            &direct,
            Some(Arc::new(FakeOcr {
                spans: spans_for("should never be used"),
            })),
        );

        let text = ex.extract(b"%PDF-1.4", FileFormat::Pdf).await.unwrap();
        assert!(!text.contains("should never"));
    }

    #[tokio::test]
    async fn test_sparse_pdf_keeps_direct_when_ocr_is_shorter() {
        let direct = "Jane Doe jane@example.com 555-123-4567!";
        let ex = extractor(
            direct,
            Some(Arc::new(FakeOcr {
                spans: spans_for("tiny"),
            })),
        );

        let text = ex.extract(b"%PDF-1.4", FileFormat::Pdf).await.unwrap();
        assert_eq!(text, direct);
    }

    #[tokio::test]
    async fn test_sparse_pdf_survives_ocr_failure() {
        let direct = "Jane Doe jane@example.com 555-123-4567!";
        let ex = extractor(direct, Some(Arc::new(FailingOcr)));

        let text = ex.extract(b"%PDF-1.4", FileFormat::Pdf).await.unwrap();
        assert_eq!(text, direct);
    }

    #[tokio::test]
    async fn test_image_without_ocr_fails() {
        let ex = extractor("", None);
        let err = ex.extract(&[0x89, 0x50], FileFormat::Png).await.unwrap_err();
        assert!(matches!(err, ExtractionError::OcrUnavailable));
    }

    #[tokio::test]
    async fn test_image_spans_filtered_by_confidence() {
        let spans = vec![
            OcrSpan {
                text: "Jane Doe Software Engineer".into(),
                confidence: 0.9,
            },
            OcrSpan {
                text: "garbage".into(),
                confidence: 0.2,
            },
        ];
        let ex = extractor("", Some(Arc::new(FakeOcr { spans })));

        let text = ex.extract(&[0xff, 0xd8], FileFormat::Jpg).await.unwrap();
        assert_eq!(text, "Jane Doe Software Engineer");
    }

    #[tokio::test]
    async fn test_docx_container_extraction() {
        let ex = extractor("", None);
        let body = "<w:document><w:body>\
                    <w:p><w:r><w:t>Jane Doe</w:t></w:r></w:p>\
                    <w:p><w:r><w:t>Software Engineer</w:t></w:r></w:p>\
                    </w:body></w:document>";

        let text = ex
            .extract(&docx_bytes(body), FileFormat::Docx)
            .await
            .unwrap();
        assert_eq!(text, "Jane Doe\nSoftware Engineer");
    }

    #[tokio::test]
    async fn test_rtf_stripping() {
        let ex = extractor("", None);
        let rtf = br"{\rtf1\ansi Jane Doe\par Software Engineer at Acme}";

        let text = ex.extract(rtf, FileFormat::Rtf).await.unwrap();
        assert!(text.contains("Jane Doe"));
        assert!(text.contains("Software Engineer at Acme"));
        assert!(!text.contains("rtf1"));
    }

    #[tokio::test]
    async fn test_legacy_doc_without_converters_byte_decodes() {
        let ex = extractor("", None).with_legacy_chain(ConverterChain::new(vec![]));
        let mut data = vec![0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
        data.extend_from_slice(b"Jane Doe Senior Engineer jane@example.com");
        data.extend_from_slice(&[0x00, 0x01]);

        let text = ex.extract(&data, FileFormat::Doc).await.unwrap();
        assert!(text.contains("Jane Doe Senior Engineer"));
    }

    #[tokio::test]
    async fn test_too_short_output_is_no_text() {
        let ex = extractor("", None);
        let err = ex.extract(b"hi there!", FileFormat::Txt).await.unwrap_err();
        assert!(matches!(err, ExtractionError::NoText));
    }
}
