mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use intake_core::bulk::{BulkProcessor, InputFile};
use intake_core::config::ProcessingConfig;
use intake_core::dedup::DuplicateDetector;
use intake_core::ingest::{
    ContactRecoverer, FormatValidator, NormalizeMode, ResumePipeline, TextExtractor,
    TextNormalizer,
};
use intake_core::ocr::{OcrEngine, PopplerBackend, TesseractOcr};
use intake_core::store::SqliteStore;
use intake_core::{HttpEmbedder, HttpFieldExtractor, ResumeProcessor};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ProcessingConfig::default();

    match cli.command {
        Commands::Parse {
            path,
            ai_endpoint,
            embed_endpoint,
            api_key,
        } => run_parse(&config, &path, &ai_endpoint, embed_endpoint.as_deref(), api_key).await,
        Commands::Bulk {
            paths,
            ai_endpoint,
            embed_endpoint,
            api_key,
            concurrency,
            db,
        } => {
            run_bulk(
                config,
                &paths,
                &ai_endpoint,
                embed_endpoint.as_deref(),
                api_key,
                concurrency,
                db,
            )
            .await
        }
        Commands::Inspect { path } => run_inspect(&config, &path).await,
    }
}

fn build_pipeline(
    config: &ProcessingConfig,
    ai_endpoint: &str,
    embed_endpoint: Option<&str>,
    api_key: Option<String>,
) -> Result<ResumePipeline> {
    let endpoint = url::Url::parse(ai_endpoint).context("invalid --ai-endpoint")?;
    let mut extractor = HttpFieldExtractor::new(endpoint)?;
    if let Some(key) = &api_key {
        extractor = extractor.with_api_key(key.clone());
    }

    let mut pipeline = ResumePipeline::new(config, Arc::new(extractor));

    if let Some(embed) = embed_endpoint {
        let endpoint = url::Url::parse(embed).context("invalid --embed-endpoint")?;
        let mut embedder = HttpEmbedder::new(endpoint)?;
        if let Some(key) = api_key {
            embedder = embedder.with_api_key(key);
        }
        pipeline = pipeline.with_embedder(Arc::new(embedder));
    }

    Ok(pipeline)
}

async fn run_parse(
    config: &ProcessingConfig,
    path: &Path,
    ai_endpoint: &str,
    embed_endpoint: Option<&str>,
    api_key: Option<String>,
) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = file_name(path);

    let pipeline = build_pipeline(config, ai_endpoint, embed_endpoint, api_key)?;
    let processor = ResumeProcessor::new(
        FormatValidator::new(config.limits.clone()),
        pipeline,
        config.retry.clone(),
    );

    let result = processor.submit(&data, &filename).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.success {
        Ok(())
    } else {
        bail!("processing failed: {}", filename)
    }
}

async fn run_bulk(
    config: ProcessingConfig,
    paths: &[PathBuf],
    ai_endpoint: &str,
    embed_endpoint: Option<&str>,
    api_key: Option<String>,
    concurrency: Option<usize>,
    db: Option<PathBuf>,
) -> Result<()> {
    if paths.is_empty() {
        bail!("no files given");
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        files.push(InputFile::new(file_name(path), data));
    }

    let db_path = match db {
        Some(path) => path,
        None => default_db_path()?,
    };
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let store = Arc::new(SqliteStore::open(&db_path.to_string_lossy()).await?);

    let pipeline = build_pipeline(&config, ai_endpoint, embed_endpoint, api_key)?;
    let processor = Arc::new(ResumeProcessor::new(
        FormatValidator::new(config.limits.clone()),
        pipeline,
        config.retry.clone(),
    ));
    let dedup = Arc::new(DuplicateDetector::new(config.dedup.clone(), store.clone()));

    let mut bulk_config = config.bulk.clone();
    if let Some(workers) = concurrency {
        bulk_config.max_concurrency = workers;
    }

    let bulk = BulkProcessor::new(processor, dedup, store, bulk_config);
    let job_id = bulk.submit_bulk(files).await;
    eprintln!("job {job_id} started");

    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let Some(job) = bulk.status(job_id).await else {
            bail!("job {job_id} disappeared");
        };

        eprintln!(
            "{}: {}/{} ({:.0}%) ok={} failed={} dup={}",
            job.status, job.processed, job.total, job.progress_percent,
            job.successful, job.failed, job.duplicates,
        );

        if job.status.is_terminal() {
            println!("{}", serde_json::to_string_pretty(&job)?);
            break;
        }
    }

    Ok(())
}

async fn run_inspect(config: &ProcessingConfig, path: &Path) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = file_name(path);

    let validator = FormatValidator::new(config.limits.clone());
    let validation = validator.validate(&data, &filename);
    let Some(format) = validation.detected_format.filter(|_| validation.is_valid) else {
        println!("{}", serde_json::to_string_pretty(&validation)?);
        bail!(
            "validation failed: {}",
            validation
                .error_message
                .unwrap_or_else(|| "unknown reason".to_string())
        );
    };

    let ocr = TesseractOcr::new();
    let ocr: Option<Arc<dyn OcrEngine>> = if ocr.available() {
        Some(Arc::new(ocr))
    } else {
        None
    };
    let extractor = TextExtractor::new(
        config.limits.clone(),
        config.ocr.clone(),
        Arc::new(PopplerBackend::new()),
        ocr,
    );

    let text = extractor
        .extract(&data, format)
        .await
        .map_err(|e| anyhow::anyhow!("extraction failed: {e}"))?;

    let normalizer = TextNormalizer::new(config.normalizer.clone());
    let (normalized, stats) = normalizer.normalize(&text, NormalizeMode::Standard);
    let contact = ContactRecoverer::new().recover(&normalized);

    let summary = serde_json::json!({
        "filename": filename,
        "format": format,
        "validation": validation,
        "extracted_chars": text.chars().count(),
        "normalized_chars": normalized.chars().count(),
        "lines_dropped": stats.lines_dropped,
        "truncated": stats.truncated,
        "contact": contact,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy().into_owned(), |n| n.to_string_lossy().into_owned())
}

fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not resolve a data directory")?;
    Ok(base.join("intake").join("intake.db"))
}
