use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::BulkConfig;
use crate::dedup::{DuplicateDetector, DuplicateVerdict};
use crate::ingest::FileFormat;
use crate::quality::QualityTier;
use crate::retry::{ProcessingResult, ResumeProcessor};
use crate::store::{RecordStore, StoredRecord};

/// One file handed to the bulk orchestrator. Archive members keep their
/// in-archive path as the logical filename.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Lifecycle of a bulk job. Transitions are monotonic except `Cancelled`,
/// which may be requested externally at any non-terminal point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed | Self::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Success,
    Failed,
    Duplicate,
}

/// Per-file entry appended to a job's result list in completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub filename: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl FileOutcome {
    fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: FileStatus::Failed,
            quality: None,
            error: Some(error.into()),
            friendly_error: None,
            attempts: 0,
            duration_ms: 0,
        }
    }
}

/// Snapshot-able state of one bulk job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub progress_percent: f64,
    pub results: Vec<FileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    #[must_use]
    pub fn new(job_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Queued,
            total: 0,
            processed: 0,
            successful: 0,
            failed: 0,
            duplicates: 0,
            progress_percent: 0.0,
            results: Vec::new(),
            persistence_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply one completed file. `processed` never exceeds `total` and the
    /// progress percentage is always recomputed, never stored separately.
    fn apply_outcome(&mut self, outcome: FileOutcome) {
        if self.processed >= self.total {
            tracing::warn!(
                job_id = %self.job_id,
                "dropping outcome beyond job total",
            );
            return;
        }

        self.processed += 1;
        match outcome.status {
            FileStatus::Success => self.successful += 1,
            FileStatus::Failed => self.failed += 1,
            FileStatus::Duplicate => self.duplicates += 1,
        }
        self.results.push(outcome);
        self.recompute_progress();
        self.updated_at = Utc::now();
    }

    fn recompute_progress(&mut self) {
        self.progress_percent = if self.total == 0 {
            0.0
        } else {
            (self.processed as f64 / self.total as f64) * 100.0
        };
    }
}

/// Shared map of job id to job state. Every mutation is a single
/// write-locked read-modify-write; every external read is a snapshot clone,
/// never a live reference.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, ProcessingJob>>>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: ProcessingJob) {
        self.jobs.write().await.insert(job.job_id, job);
    }

    pub async fn snapshot(&self, job_id: Uuid) -> Option<ProcessingJob> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    pub async fn update<F>(&self, job_id: Uuid, mutate: F) -> bool
    where
        F: FnOnce(&mut ProcessingJob),
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job_id) {
            Some(job) => {
                mutate(job);
                job.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn is_cancelled(&self, job_id: Uuid) -> bool {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .is_some_and(|job| job.status == JobStatus::Cancelled)
    }

    /// Request cancellation. Only effective before the job reaches a
    /// terminal state; workers notice at the next file boundary.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job_id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Cancelled;
                job.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

/// Fans a bulk submission out over a bounded worker pool, tracks progress
/// in the job registry, and hands successful records to the store as one
/// batch at the end.
#[derive(Clone)]
pub struct BulkProcessor {
    registry: JobRegistry,
    processor: Arc<ResumeProcessor>,
    dedup: Arc<DuplicateDetector>,
    store: Arc<dyn RecordStore>,
    config: BulkConfig,
}

impl BulkProcessor {
    #[must_use]
    pub fn new(
        processor: Arc<ResumeProcessor>,
        dedup: Arc<DuplicateDetector>,
        store: Arc<dyn RecordStore>,
        config: BulkConfig,
    ) -> Self {
        Self {
            registry: JobRegistry::new(),
            processor,
            dedup,
            store,
            config,
        }
    }

    /// Register a job and start processing it in the background; returns
    /// immediately with the job id.
    pub async fn submit_bulk(&self, files: Vec<InputFile>) -> Uuid {
        let job_id = Uuid::new_v4();
        self.registry.insert(ProcessingJob::new(job_id)).await;

        let this = self.clone();
        tokio::spawn(async move {
            this.run_job(job_id, files).await;
        });

        job_id
    }

    /// Snapshot of the job's current state.
    pub async fn status(&self, job_id: Uuid) -> Option<ProcessingJob> {
        self.registry.snapshot(job_id).await
    }

    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let cancelled = self.registry.cancel(job_id).await;
        if cancelled {
            tracing::info!(job_id = %job_id, "bulk job cancellation requested");
        }
        cancelled
    }

    async fn run_job(&self, job_id: Uuid, files: Vec<InputFile>) {
        let (expanded, expansion_failures) = expand_inputs(files);
        let total = expanded.len() + expansion_failures.len();

        self.registry
            .update(job_id, |job| {
                job.total = total;
                job.status = JobStatus::Processing;
            })
            .await;

        for outcome in expansion_failures {
            self.registry
                .update(job_id, |job| job.apply_outcome(outcome))
                .await;
        }

        tracing::info!(
            job_id = %job_id,
            files = expanded.len(),
            concurrency = self.config.max_concurrency,
            "bulk job started",
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let batch: Arc<Mutex<Vec<StoredRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let mut workers: JoinSet<()> = JoinSet::new();

        for file in expanded {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            // Cooperative cancellation, checked once per file boundary;
            // in-flight files are left to finish.
            if self.registry.is_cancelled(job_id).await {
                drop(permit);
                break;
            }

            let this = self.clone();
            let batch = Arc::clone(&batch);
            workers.spawn(async move {
                let _permit = permit;
                let outcome = this.process_one(&file, &batch).await;
                this.registry
                    .update(job_id, |job| job.apply_outcome(outcome))
                    .await;
            });
        }

        while workers.join_next().await.is_some() {}

        let records = {
            let mut batch = batch.lock().await;
            std::mem::take(&mut *batch)
        };
        let persistence_error = if records.is_empty() {
            None
        } else {
            match self.store.batch_insert(&records).await {
                Ok(ids) => {
                    tracing::info!(job_id = %job_id, count = ids.len(), "batch persisted");
                    None
                }
                Err(e) => {
                    // Reported on the job, but already-reported per-file
                    // successes stand.
                    tracing::error!(job_id = %job_id, "batch persistence failed: {e}");
                    Some(e.to_string())
                }
            }
        };

        self.registry
            .update(job_id, |job| {
                job.persistence_error = persistence_error;
                if job.status != JobStatus::Cancelled {
                    job.status = if job.failed == 0 {
                        JobStatus::Completed
                    } else {
                        JobStatus::CompletedWithErrors
                    };
                }
            })
            .await;

        if let Some(job) = self.registry.snapshot(job_id).await {
            tracing::info!(
                job_id = %job_id,
                status = job.status.as_str(),
                successful = job.successful,
                failed = job.failed,
                duplicates = job.duplicates,
                "bulk job finished",
            );
        }
    }

    /// Full pipeline for one file, then duplicate policy, then the batch
    /// buffer. Duplicate detection only ever sees valid structured output.
    async fn process_one(
        &self,
        file: &InputFile,
        batch: &Arc<Mutex<Vec<StoredRecord>>>,
    ) -> FileOutcome {
        let result = self.processor.submit(&file.bytes, &file.name).await;

        let attempts = u32::try_from(result.attempts.len()).unwrap_or(u32::MAX);
        let ProcessingResult {
            success,
            parsed,
            error,
            friendly_error,
            duration_ms,
            ..
        } = result;

        let Some(parsed) = parsed.filter(|_| success) else {
            return FileOutcome {
                filename: file.name.clone(),
                status: FileStatus::Failed,
                quality: None,
                error: error.map(|e| e.message),
                friendly_error,
                attempts,
                duration_ms,
            };
        };

        match self.dedup.check(&parsed.profile).await {
            DuplicateVerdict::Unique => {
                let record = StoredRecord::new(
                    file.name.clone(),
                    detected_format(&file.name),
                    file.bytes.len(),
                    duration_ms,
                    parsed.quality.tier.to_string(),
                    parsed.profile.clone(),
                    parsed.embedding.clone(),
                );
                batch.lock().await.push(record);

                FileOutcome {
                    filename: file.name.clone(),
                    status: FileStatus::Success,
                    quality: Some(parsed.quality.tier),
                    error: None,
                    friendly_error: None,
                    attempts,
                    duration_ms,
                }
            }
            DuplicateVerdict::Duplicate {
                field, value, ..
            } => FileOutcome {
                filename: file.name.clone(),
                status: FileStatus::Duplicate,
                quality: Some(parsed.quality.tier),
                error: Some(format!("duplicate {field}: {value}")),
                friendly_error: Some(
                    "A resume for this candidate has already been ingested.".to_string(),
                ),
                attempts,
                duration_ms,
            },
            DuplicateVerdict::MissingRequiredFields { missing } => FileOutcome {
                filename: file.name.clone(),
                status: FileStatus::Failed,
                quality: Some(parsed.quality.tier),
                error: Some(format!(
                    "missing required fields: {}",
                    missing.join(", ")
                )),
                friendly_error: None,
                attempts,
                duration_ms,
            },
        }
    }
}

fn detected_format(filename: &str) -> FileFormat {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(FileFormat::from_extension)
        .unwrap_or(FileFormat::Txt)
}

/// Expand ZIP archives into their contained supported files; everything
/// else passes through untouched. Unreadable archives become per-file
/// failures rather than aborting the job.
fn expand_inputs(files: Vec<InputFile>) -> (Vec<InputFile>, Vec<FileOutcome>) {
    let mut expanded = Vec::new();
    let mut failures = Vec::new();

    for file in files {
        if !file.name.to_lowercase().ends_with(".zip") {
            expanded.push(file);
            continue;
        }

        match expand_archive(&file) {
            Ok(mut members) => {
                tracing::info!(
                    archive = %file.name,
                    members = members.len(),
                    "archive expanded",
                );
                expanded.append(&mut members);
            }
            Err(e) => {
                failures.push(FileOutcome::failed(
                    file.name.clone(),
                    format!("failed to expand archive: {e}"),
                ));
            }
        }
    }

    (expanded, failures)
}

fn expand_archive(file: &InputFile) -> std::io::Result<Vec<InputFile>> {
    let cursor = std::io::Cursor::new(&file.bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let mut members = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let supported = std::path::Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FileFormat::from_extension)
            .is_some();
        if !supported {
            continue;
        }

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        members.push(InputFile::new(name, bytes));
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_job_counters_and_progress() {
        let mut job = ProcessingJob::new(Uuid::new_v4());
        job.total = 4;

        job.apply_outcome(FileOutcome::failed("a.pdf", "nope"));
        assert_eq!(job.processed, 1);
        assert!((job.progress_percent - 25.0).abs() < 1e-9);

        job.apply_outcome(FileOutcome {
            filename: "b.pdf".into(),
            status: FileStatus::Success,
            quality: Some(QualityTier::Good),
            error: None,
            friendly_error: None,
            attempts: 1,
            duration_ms: 5,
        });
        assert_eq!(job.successful, 1);
        assert_eq!(job.failed, 1);
        assert!((job.progress_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_processed_never_exceeds_total() {
        let mut job = ProcessingJob::new(Uuid::new_v4());
        job.total = 1;

        job.apply_outcome(FileOutcome::failed("a.pdf", "x"));
        job.apply_outcome(FileOutcome::failed("b.pdf", "x"));

        assert_eq!(job.processed, 1);
        assert_eq!(job.results.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_only_affects_non_terminal_jobs() {
        let registry = JobRegistry::new();
        let job_id = Uuid::new_v4();
        registry.insert(ProcessingJob::new(job_id)).await;

        assert!(registry.cancel(job_id).await);
        assert!(registry.is_cancelled(job_id).await);
        // Already terminal; a second request is refused.
        assert!(!registry.cancel(job_id).await);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let registry = JobRegistry::new();
        let job_id = Uuid::new_v4();
        registry.insert(ProcessingJob::new(job_id)).await;

        let snapshot = registry.snapshot(job_id).await.unwrap();
        registry
            .update(job_id, |job| job.status = JobStatus::Processing)
            .await;

        assert_eq!(snapshot.status, JobStatus::Queued);
    }

    fn zip_with(names: &[&str]) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            for name in names {
                writer.start_file(*name, options).unwrap();
                writer
                    .write_all(b"placeholder resume content, long enough to pass")
                    .unwrap();
            }
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_expand_inputs_unpacks_supported_members() {
        let archive = zip_with(&["folder/jane.pdf", "folder/notes.xyz", "john.txt"]);
        let files = vec![
            InputFile::new("batch.zip", archive),
            InputFile::new("direct.docx", vec![1, 2, 3]),
        ];

        let (expanded, failures) = expand_inputs(files);
        assert!(failures.is_empty());

        let names: Vec<&str> = expanded.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"folder/jane.pdf"));
        assert!(names.contains(&"john.txt"));
        assert!(names.contains(&"direct.docx"));
        // Unsupported member is skipped.
        assert!(!names.iter().any(|n| n.ends_with(".xyz")));
    }

    #[test]
    fn test_broken_archive_becomes_per_file_failure() {
        let files = vec![InputFile::new("bad.zip", vec![0x50, 0x4b, 0xff])];
        let (expanded, failures) = expand_inputs(files);

        assert!(expanded.is_empty());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].status, FileStatus::Failed);
    }
}
