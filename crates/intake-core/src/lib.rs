pub mod ai;
pub mod bulk;
pub mod candidate;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod ocr;
pub mod quality;
pub mod report;
pub mod retry;
pub mod store;

pub use ai::{Embedder, ExtractError, FieldExtractor, HttpEmbedder, HttpFieldExtractor};
pub use bulk::{
    BulkProcessor, FileOutcome, FileStatus, InputFile, JobRegistry, JobStatus, ProcessingJob,
};
pub use candidate::{
    CandidateProfile, ContactInfo, ContactSource, EducationEntry, ExperienceEntry,
};
pub use config::ProcessingConfig;
pub use dedup::{DuplicateDetector, DuplicateHistorySource, DuplicateVerdict};
pub use error::{Error, FailureContext, FailureKind, ParseFailure, Result};
pub use ingest::{
    FileFormat, FormatValidator, ParsedResume, ResumePipeline, TextExtractor, TextNormalizer,
    ValidationResult,
};
pub use ocr::{OcrEngine, OcrSpan, PdfBackend, PopplerBackend, TesseractOcr};
pub use quality::{classify, QualityReport, QualityTier};
pub use report::{ErrorMetrics, ErrorReporter};
pub use retry::{
    AttemptOutcome, ProcessingResult, ProcessorMetrics, ResumeProcessor, RetryAttempt,
    RetryStrategy,
};
pub use store::{RecordStore, SqliteStore, StoredRecord};
