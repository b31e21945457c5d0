//! The certificate lifecycle: upload, completion (scoring), validation and the
//! read-side queries built on top of the stored records.
//!
//! [`CertificateService`] owns no state of its own. Every collaborator is
//! constructed once at start-up and injected as a shared handle, so the
//! service is cheap to clone into each request.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::CertificateStore;
use crate::dto::{
    AfterNormalized, CertificateRecord, Completion, CompletionOutcome, CompletionRequest,
    RecordFilter, Status, StoredCertificate, UploadOutcome, ValidationOutcome,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{AppError, Result};
use crate::evidence::{evidence_path, EvidenceStore};
use crate::extraction::FieldExtractor;
use crate::leaderboard::{self, LeaderboardEntry};
use crate::normalize::normalize;
use crate::ocr::{DocumentReader, RawSubmission};
use crate::ranking::{self, RankWeights, SearchGroup};
use crate::scoring::compute_score;
use crate::stats::{self, StatusCounts, SubmitterSummary};
use crate::text::{clean_text, fingerprint};

#[derive(Clone)]
pub struct CertificateService {
    store: Arc<dyn CertificateStore>,
    reader: Arc<dyn DocumentReader>,
    extractor: FieldExtractor,
    embedder: Arc<dyn EmbeddingProvider>,
    evidence: Arc<dyn EvidenceStore>,
    weights: RankWeights,
}

impl CertificateService {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        reader: Arc<dyn DocumentReader>,
        extractor: FieldExtractor,
        embedder: Arc<dyn EmbeddingProvider>,
        evidence: Arc<dyn EvidenceStore>,
    ) -> Self {
        Self {
            store,
            reader,
            extractor,
            embedder,
            evidence,
            weights: RankWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: RankWeights) -> Self {
        self.weights = weights;
        self
    }

    /// OCR, clean, fingerprint, dedup, extract, store evidence and insert a
    /// `processed` record. Nothing is written for a duplicate.
    pub async fn upload(
        &self,
        submission: RawSubmission,
        submitter_id: &str,
    ) -> Result<UploadOutcome> {
        let raw = self.reader.read(&submission).await?;
        let cleaned = clean_text(&raw);
        let fp = fingerprint(&cleaned);

        if self.store.find_by_fingerprint(&fp).await?.is_some() {
            warn!(fingerprint = %fp, submitter_id, "duplicate certificate rejected");
            return Err(AppError::DuplicateContent { fingerprint: fp });
        }

        let parsed = self.extractor.extract(&cleaned).await?;

        let path = evidence_path(&submission.filename, Utc::now());
        let evidence_url = self.evidence.upload(&submission.bytes, &path).await?;

        let record =
            CertificateRecord::processed(fp.clone(), submitter_id.to_string(), Some(evidence_url), parsed);
        if let Err(err) = self.store.insert(&record).await {
            if let Err(e) = self.evidence.remove(&path).await {
                warn!(%e, path = %path, "could not remove orphaned evidence");
            }
            return Err(err);
        }
        info!(id = %record.id, fingerprint = %fp, submitter_id, "certificate processed");

        Ok(UploadOutcome {
            id: record.id,
            document_fingerprint: fp,
            parsed: record.parsed,
        })
    }

    /// Scores the (possibly user-corrected) fields and attaches the snapshot
    /// and embedding. Re-running on a `processed` record recomputes both.
    pub async fn complete(&self, req: CompletionRequest) -> Result<CompletionOutcome> {
        let fp = req.document_fingerprint;
        let existing = self
            .store
            .find_by_fingerprint(&fp)
            .await?
            .ok_or_else(|| AppError::RecordNotFound(format!("certificate {fp}")))?;
        if existing.status != Status::Processed {
            return Err(AppError::InvalidStateTransition {
                id: existing.id.to_string(),
                status: existing.status.to_string(),
            });
        }

        let parsed = req.parsed;
        let normalized = normalize(&parsed);
        let spu = compute_score(&normalized, &parsed);
        let embedding = match self.embedder.embed(&parsed.embedding_text()).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(fingerprint = %fp, %e, "storing certificate without embedding");
                None
            }
        };

        let completion = Completion {
            before_normalized: parsed.categories(),
            after_normalized: AfterNormalized::new(normalized, spu),
            embedding,
            parsed,
        };
        if !self.store.save_completion(&fp, &completion).await? {
            // validated (or removed) since the status check above
            return Err(match self.store.find_by_fingerprint(&fp).await? {
                Some(current) => AppError::InvalidStateTransition {
                    id: current.id.to_string(),
                    status: current.status.to_string(),
                },
                None => AppError::RecordNotFound(format!("certificate {fp}")),
            });
        }
        info!(fingerprint = %fp, spu_score = spu, "certificate scored");

        Ok(CompletionOutcome {
            document_fingerprint: fp,
            has_embedding: completion.embedding.is_some(),
            parsed: completion.parsed,
            before_normalized: completion.before_normalized,
            after_normalized: completion.after_normalized,
        })
    }

    /// `processed -> validated`. Any other starting state is rejected. The staff
    /// profile is read before the transition so a failed lookup leaves the
    /// record untouched.
    pub async fn validate(&self, id: Uuid, staff_id: &str) -> Result<ValidationOutcome> {
        let current = self.detail(id).await?;
        if current.record.status != Status::Processed {
            return Err(AppError::InvalidStateTransition {
                id: id.to_string(),
                status: current.record.status.to_string(),
            });
        }

        let staff = self.store.staff(staff_id).await?;
        let at = Utc::now();
        if !self.store.mark_validated(id, staff_id, at).await? {
            // lost a race against another validation
            return Err(AppError::InvalidStateTransition {
                id: id.to_string(),
                status: Status::Validated.to_string(),
            });
        }
        info!(%id, staff_id, "certificate validated");

        let parsed = current.record.parsed;
        Ok(ValidationOutcome {
            id,
            status: Status::Validated,
            event_name: parsed.event_name,
            student_name: parsed.student_name,
            validated_at: at,
            validated_by: staff_id.to_string(),
            staff,
        })
    }

    pub async fn detail(&self, id: Uuid) -> Result<StoredCertificate> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::RecordNotFound(format!("certificate {id}")))
    }

    pub async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredCertificate>> {
        self.store.list(filter).await
    }

    /// Semantic search with a text-match fallback. Embedding failures only
    /// reduce relevance; they never fail the request.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchGroup>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = self.store.list(&RecordFilter::ranked()).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = match self.embedder.embed(query).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(%e, "query embedding unavailable; using text match only");
                None
            }
        };
        Ok(ranking::search(
            query,
            query_embedding.as_deref(),
            &candidates,
            limit,
            self.weights,
        ))
    }

    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let rows = self.store.list(&RecordFilter::ranked()).await?;
        Ok(leaderboard::aggregate(&rows, limit))
    }

    pub async fn dashboard_counts(&self) -> Result<StatusCounts> {
        let rows = self.store.list(&RecordFilter::default()).await?;
        Ok(stats::status_counts(&rows))
    }

    pub async fn submitter_summary(&self, submitter_id: &str) -> Result<SubmitterSummary> {
        let rows = self.store.list(&RecordFilter::submitter(submitter_id)).await?;
        Ok(stats::submitter_summary(submitter_id, &rows))
    }
}
