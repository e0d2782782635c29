use std::path::Path;

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    #[error("OCR failed: {0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OcrResult<T> = Result<T, OcrError>;

/// One recognized text span with the engine's confidence for it.
#[derive(Debug, Clone)]
pub struct OcrSpan {
    pub text: String,
    pub confidence: f64,
}

/// Boundary to an external OCR engine. Per-span confidence must be
/// thresholded by the caller.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn available(&self) -> bool;

    async fn recognize(&self, image: &[u8], extension: &str) -> OcrResult<Vec<OcrSpan>>;
}

/// Join spans whose confidence clears the threshold.
#[must_use]
pub fn join_confident_spans(spans: &[OcrSpan], threshold: f64) -> String {
    spans
        .iter()
        .filter(|span| span.confidence > threshold)
        .map(|span| span.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tesseract invoked as a host tool, reading confidences from TSV output.
#[derive(Debug, Clone, Default)]
pub struct TesseractOcr {
    language: Option<String>,
}

impl TesseractOcr {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn available(&self) -> bool {
        which::which("tesseract").is_ok()
    }

    async fn recognize(&self, image: &[u8], extension: &str) -> OcrResult<Vec<OcrSpan>> {
        if !self.available() {
            return Err(OcrError::Unavailable("tesseract not on PATH".to_string()));
        }

        let dir = tempfile::tempdir()?;
        let input = dir.path().join(format!("page.{extension}"));
        tokio::fs::write(&input, image).await?;

        let mut cmd = Command::new("tesseract");
        cmd.arg(&input).arg("stdout").arg("tsv");
        if let Some(lang) = &self.language {
            cmd.arg("-l").arg(lang);
        }

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(OcrError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Tesseract TSV: word-level rows carry the text in the last column and a
/// 0-100 confidence in the second-to-last.
fn parse_tsv(tsv: &str) -> Vec<OcrSpan> {
    let mut spans = Vec::new();

    for line in tsv.lines().skip(1) {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 {
            continue;
        }
        let text = columns[11].trim();
        if text.is_empty() {
            continue;
        }
        let Ok(conf) = columns[10].parse::<f64>() else {
            continue;
        };
        if conf < 0.0 {
            continue;
        }

        spans.push(OcrSpan {
            text: text.to_string(),
            confidence: conf / 100.0,
        });
    }

    spans
}

/// Renders PDF pages to images and pulls the native text layer; both
/// operations are delegated to host tooling and individually optional.
#[async_trait::async_trait]
pub trait PdfBackend: Send + Sync {
    async fn extract_text(&self, data: &[u8]) -> OcrResult<String>;

    /// Render up to `max_pages` leading pages as PNG images.
    async fn render_pages(&self, data: &[u8], max_pages: u32) -> OcrResult<Vec<Vec<u8>>>;
}

/// Poppler-utils backend: `pdftotext` for the text layer, `pdftoppm` for
/// page rendering.
#[derive(Debug, Clone, Default)]
pub struct PopplerBackend;

impl PopplerBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl PdfBackend for PopplerBackend {
    async fn extract_text(&self, data: &[u8]) -> OcrResult<String> {
        if which::which("pdftotext").is_err() {
            return Err(OcrError::Unavailable("pdftotext not on PATH".to_string()));
        }

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.pdf");
        tokio::fs::write(&input, data).await?;

        let output = Command::new("pdftotext")
            .arg("-layout")
            .arg(&input)
            .arg("-")
            .output()
            .await?;

        if !output.status.success() {
            return Err(OcrError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn render_pages(&self, data: &[u8], max_pages: u32) -> OcrResult<Vec<Vec<u8>>> {
        if which::which("pdftoppm").is_err() {
            return Err(OcrError::Unavailable("pdftoppm not on PATH".to_string()));
        }

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.pdf");
        tokio::fs::write(&input, data).await?;

        let prefix = dir.path().join("page");
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg("150")
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(max_pages.to_string())
            .arg(&input)
            .arg(&prefix)
            .output()
            .await?;

        if !output.status.success() {
            return Err(OcrError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        collect_rendered_pages(dir.path()).await
    }
}

async fn collect_rendered_pages(dir: &Path) -> OcrResult<Vec<Vec<u8>>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("png") {
            names.push(path);
        }
    }
    names.sort();

    let mut pages = Vec::with_capacity(names.len());
    for path in names {
        pages.push(tokio::fs::read(path).await?);
    }
    Ok(pages)
}
