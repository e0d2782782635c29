use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use uuid::Uuid;

use crate::candidate::CandidateProfile;
use crate::dedup::DuplicateHistorySource;
use crate::ingest::FileFormat;
use crate::Result;

const INIT_SQL: &str = r"
CREATE TABLE IF NOT EXISTS candidates (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    file_format TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    processing_ms INTEGER NOT NULL,
    quality TEXT NOT NULL,
    profile TEXT NOT NULL,
    embedding TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_candidates_created ON candidates(created_at);
CREATE INDEX IF NOT EXISTS idx_candidates_quality ON candidates(quality);
";

/// One parsed resume as persisted after a bulk batch completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub filename: String,
    pub file_format: FileFormat,
    pub file_size: usize,
    pub processing_ms: u64,
    pub quality: String,
    pub profile: CandidateProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl StoredRecord {
    #[must_use]
    pub fn new(
        filename: String,
        file_format: FileFormat,
        file_size: usize,
        processing_ms: u64,
        quality: String,
        profile: CandidateProfile,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            filename,
            file_format,
            file_size,
            processing_ms,
            quality,
            profile,
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// Transactional persistence for parsed records. Partial persistence on
/// failure is store-defined; callers must not assume it.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn batch_insert(&self, records: &[StoredRecord]) -> Result<Vec<Uuid>>;
}

/// SQLite-backed record store; also serves the duplicate-history reads.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM candidates")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteStore {
    async fn batch_insert(&self, records: &[StoredRecord]) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(records.len());

        for record in records {
            let profile_json = serde_json::to_string(&record.profile)?;
            let embedding_json = record
                .embedding
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r"
                INSERT INTO candidates
                    (id, filename, file_format, file_size, processing_ms, quality, profile, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(record.id.to_string())
            .bind(&record.filename)
            .bind(record.file_format.as_str())
            .bind(i64::try_from(record.file_size).unwrap_or(i64::MAX))
            .bind(i64::try_from(record.processing_ms).unwrap_or(i64::MAX))
            .bind(&record.quality)
            .bind(profile_json)
            .bind(embedding_json)
            .bind(record.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            ids.push(record.id);
        }

        tx.commit().await?;
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl DuplicateHistorySource for SqliteStore {
    async fn recent(&self, limit: u32) -> Result<Vec<CandidateProfile>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT profile FROM candidates ORDER BY created_at DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut profiles = Vec::with_capacity(rows.len());
        for (json,) in rows {
            match serde_json::from_str(&json) {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    // A malformed stored row must not block ingestion.
                    tracing::warn!("skipping unreadable stored profile: {e}");
                }
            }
        }
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, email: &str) -> StoredRecord {
        StoredRecord::new(
            format!("{name}.pdf"),
            FileFormat::Pdf,
            1024,
            250,
            "good".to_string(),
            CandidateProfile {
                name: Some(name.to_string()),
                email: Some(email.to_string()),
                phone: Some("(555) 123-4567".into()),
                skills: vec!["rust".into()],
                ..Default::default()
            },
            Some(vec![0.1, 0.2]),
        )
    }

    #[tokio::test]
    async fn test_batch_insert_and_recent_round_trip() {
        let store = SqliteStore::open_memory().await.unwrap();

        let records = vec![
            record("Jane Doe", "jane@example.com"),
            record("John Roe", "john@example.com"),
        ];
        let ids = store.batch_insert(&records).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        let names: Vec<_> = recent.iter().filter_map(|p| p.name.as_deref()).collect();
        assert!(names.contains(&"Jane Doe"));
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let store = SqliteStore::open_memory().await.unwrap();

        let records: Vec<StoredRecord> = (0..5)
            .map(|i| record(&format!("Person {i}"), &format!("p{i}@example.com")))
            .collect();
        store.batch_insert(&records).await.unwrap();

        let recent = store.recent(3).await.unwrap();
        assert_eq!(recent.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_noop() {
        let store = SqliteStore::open_memory().await.unwrap();
        let ids = store.batch_insert(&[]).await.unwrap();
        assert!(ids.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
