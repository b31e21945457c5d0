//! Storage collaborator for certificate records.
//!
//! [`CertificateStore`] is the repository interface the pipeline talks to;
//! [`PgCertificateStore`] implements it on PostgreSQL through a deadpool pool.
//! The `UNIQUE(document_fingerprint)` constraint is what finally enforces
//! deduplication when two identical uploads race past the lookup.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::dto::{
    CertificateRecord, Completion, ParsedFields, RecordFilter, StaffProfile, Status,
    StoredCertificate, SubmitterProfile,
};
use crate::error::{AppError, Result};

#[async_trait(?Send)]
pub trait CertificateStore: Send + Sync {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<CertificateRecord>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StoredCertificate>>;

    /// Fails with [`AppError::DuplicateContent`] when the fingerprint exists.
    async fn insert(&self, record: &CertificateRecord) -> Result<()>;

    /// Writes the scoring snapshot; `false` when no `processed` record has
    /// `fingerprint`.
    async fn save_completion(&self, fingerprint: &str, completion: &Completion) -> Result<bool>;

    /// Moves a `processed` record to `validated`. Returns `false` when no
    /// record with `id` is currently `processed`.
    async fn mark_validated(&self, id: Uuid, staff_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Newest first, joined with the submitter profile.
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredCertificate>>;

    async fn staff(&self, id: &str) -> Result<Option<StaffProfile>>;
}

#[derive(Clone)]
pub struct PgCertificateStore {
    pool: Pool,
}

const SELECT_JOINED: &str = r#"
    SELECT c.id, c.document_fingerprint, c.submitter_id, c.evidence_url, c.status,
           c.parsed, c.before_normalized, c.after_normalized, c.embedding,
           c.created_at, c.validated_by, c.validated_at,
           s.id AS s_id, s.name AS s_name, s.student_number AS s_student_number,
           s.program AS s_program, s.faculty AS s_faculty
      FROM certificates c
      LEFT JOIN submitters s ON s.id = c.submitter_id
"#;

impl PgCertificateStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn connect(settings: &Settings) -> Result<Self> {
        let pg_config = tokio_postgres::Config::from_str(&settings.database_url).map_err(|err| {
            error!(error = %err, "failed to parse DATABASE_URL");
            AppError::Database(format!("invalid database url: {err}"))
        })?;
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(settings.db_pool_size)
            .build()
            .map_err(|err| {
                error!(error = %err, "failed to build postgres pool");
                AppError::Database(err.to_string())
            })?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS submitters (
                    id             text PRIMARY KEY,
                    name           text NOT NULL,
                    student_number text,
                    program        text,
                    faculty        text
                );
                CREATE TABLE IF NOT EXISTS staff (
                    id   text PRIMARY KEY,
                    name text NOT NULL
                );
                CREATE TABLE IF NOT EXISTS certificates (
                    id                   uuid PRIMARY KEY,
                    document_fingerprint text NOT NULL UNIQUE,
                    submitter_id         text NOT NULL,
                    evidence_url         text,
                    status               text NOT NULL DEFAULT 'processed',
                    parsed               jsonb NOT NULL,
                    before_normalized    jsonb,
                    after_normalized     jsonb,
                    embedding            real[],
                    created_at           timestamptz NOT NULL DEFAULT now(),
                    validated_by         text,
                    validated_at         timestamptz
                );
                CREATE INDEX IF NOT EXISTS certificates_submitter_idx
                    ON certificates (submitter_id);
                "#,
            )
            .await?;
        info!("certificate schema ready");
        Ok(())
    }
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, column: &str) -> Option<T> {
    let value: Option<Value> = row.get(column);
    match value.map(serde_json::from_value::<T>) {
        Some(Ok(v)) => Some(v),
        Some(Err(err)) => {
            warn!(%err, column, "unreadable json column; treating as absent");
            None
        }
        None => None,
    }
}

fn record_from_row(row: &Row) -> CertificateRecord {
    let id: Uuid = row.get("id");
    let status_text: String = row.get("status");
    let status = Status::from_str(&status_text).unwrap_or_else(|err| {
        warn!(error = %err, status = %status_text, %id, "unknown certificate status; treating as processed");
        Status::Processed
    });
    let parsed: ParsedFields =
        json_column(row, "parsed").unwrap_or_else(|| ParsedFields::unknown(0.0));
    CertificateRecord {
        id,
        document_fingerprint: row.get("document_fingerprint"),
        submitter_id: row.get("submitter_id"),
        evidence_url: row.get("evidence_url"),
        status,
        parsed,
        before_normalized: json_column(row, "before_normalized"),
        after_normalized: json_column(row, "after_normalized"),
        embedding: row.get("embedding"),
        created_at: row.get("created_at"),
        validated_by: row.get("validated_by"),
        validated_at: row.get("validated_at"),
    }
}

fn joined_from_row(row: &Row) -> StoredCertificate {
    let submitter_id: Option<String> = row.get("s_id");
    let submitter = submitter_id.map(|id| SubmitterProfile {
        id,
        name: row.get("s_name"),
        student_number: row.get("s_student_number"),
        program: row.get("s_program"),
        faculty: row.get("s_faculty"),
    });
    StoredCertificate {
        record: record_from_row(row),
        submitter,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Database(e.to_string()))
}

#[async_trait(?Send)]
impl CertificateStore for PgCertificateStore {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<CertificateRecord>> {
        let client = self.pool.get().await?;
        let sql = format!("{SELECT_JOINED} WHERE c.document_fingerprint = $1");
        let row = client.query_opt(sql.as_str(), &[&fingerprint]).await?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StoredCertificate>> {
        let client = self.pool.get().await?;
        let sql = format!("{SELECT_JOINED} WHERE c.id = $1");
        let row = client.query_opt(sql.as_str(), &[&id]).await?;
        Ok(row.as_ref().map(joined_from_row))
    }

    async fn insert(&self, record: &CertificateRecord) -> Result<()> {
        let client = self.pool.get().await?;
        let parsed = to_json(&record.parsed)?;
        let before = record.before_normalized.as_ref().map(to_json).transpose()?;
        let after = record.after_normalized.as_ref().map(to_json).transpose()?;
        let res = client
            .execute(
                "INSERT INTO certificates
                    (id, document_fingerprint, submitter_id, evidence_url, status, parsed,
                     before_normalized, after_normalized, embedding, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    &record.id,
                    &record.document_fingerprint,
                    &record.submitter_id,
                    &record.evidence_url,
                    &record.status.as_ref(),
                    &parsed,
                    &before,
                    &after,
                    &record.embedding,
                    &record.created_at,
                ],
            )
            .await;
        match res {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(AppError::DuplicateContent {
                    fingerprint: record.document_fingerprint.clone(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save_completion(&self, fingerprint: &str, completion: &Completion) -> Result<bool> {
        let client = self.pool.get().await?;
        let parsed = to_json(&completion.parsed)?;
        let before = to_json(&completion.before_normalized)?;
        let after = to_json(&completion.after_normalized)?;
        let n = client
            .execute(
                "UPDATE certificates
                    SET parsed = $2, before_normalized = $3, after_normalized = $4, embedding = $5
                  WHERE document_fingerprint = $1 AND status = 'processed'",
                &[&fingerprint, &parsed, &before, &after, &completion.embedding],
            )
            .await?;
        Ok(n > 0)
    }

    async fn mark_validated(&self, id: Uuid, staff_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let client = self.pool.get().await?;
        let n = client
            .execute(
                "UPDATE certificates
                    SET status = 'validated', validated_by = $2, validated_at = $3
                  WHERE id = $1 AND status = 'processed'",
                &[&id, &staff_id, &at],
            )
            .await?;
        Ok(n > 0)
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredCertificate>> {
        let client = self.pool.get().await?;
        let statuses: Option<Vec<String>> = filter
            .statuses
            .as_ref()
            .map(|set| set.iter().map(|s| s.to_string()).collect());
        let sql = format!(
            "{SELECT_JOINED}
              WHERE ($1::text IS NULL OR c.submitter_id = $1)
                AND ($2::text[] IS NULL OR c.status = ANY($2))
              ORDER BY c.created_at DESC"
        );
        let rows = client
            .query(sql.as_str(), &[&filter.submitter_id, &statuses])
            .await?;
        Ok(rows.iter().map(joined_from_row).collect())
    }

    async fn staff(&self, id: &str) -> Result<Option<StaffProfile>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT id, name FROM staff WHERE id = $1", &[&id])
            .await?;
        Ok(row.map(|r| StaffProfile {
            id: r.get("id"),
            name: r.get("name"),
        }))
    }
}
