//! Records and payloads shared between the certificate pipeline, the storage
//! collaborators and the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Sentinel written into text fields the extractor could not read.
pub const UNKNOWN: &str = "Unknown";

/// Confidence assumed when the language model omits one.
pub const DEFAULT_LLM_CONFIDENCE: f64 = 0.7;

/// Confidence attached to rule-based extraction results.
pub const DEFAULT_RULE_CONFIDENCE: f64 = 0.5;

/// Lifecycle state of a certificate. `Processed -> Validated` is the only transition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Processed,
    Validated,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

fn default_confidence() -> f64 {
    DEFAULT_LLM_CONFIDENCE
}

/// Accepts numbers, numeric strings and nulls; anything unusable becomes the default.
fn lenient_confidence<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(de)?;
    Ok(coerce_confidence(&v).unwrap_or(DEFAULT_LLM_CONFIDENCE))
}

/// Coerces a JSON value to a confidence in `[0, 1]`.
pub fn coerce_confidence(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    f.is_finite().then(|| f.clamp(0.0, 1.0))
}

/// Structured facts extracted from a certificate's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFields {
    #[serde(default = "unknown", alias = "nama_mahasiswa")]
    pub student_name: String,
    #[serde(default = "unknown")]
    pub event_name: String,
    #[serde(default = "unknown")]
    pub rank_raw: String,
    #[serde(default = "unknown")]
    pub level_raw: String,
    #[serde(default = "unknown")]
    pub category_raw: String,
    #[serde(default = "unknown")]
    pub domain_raw: String,
    #[serde(default)]
    pub date_issued: Option<String>,
    #[serde(default = "default_confidence", deserialize_with = "lenient_confidence")]
    pub confidence: f64,
}

impl ParsedFields {
    /// A complete record with every field at its fallback default.
    pub fn unknown(confidence: f64) -> Self {
        Self {
            student_name: unknown(),
            event_name: unknown(),
            rank_raw: unknown(),
            level_raw: unknown(),
            category_raw: unknown(),
            domain_raw: unknown(),
            date_issued: None,
            confidence,
        }
    }

    /// Builds fields from a model-produced JSON object, backfilling gaps.
    ///
    /// Missing, empty or non-string text fields become [`UNKNOWN`]; a missing or
    /// non-numeric confidence becomes [`DEFAULT_LLM_CONFIDENCE`]. Returns `None`
    /// when `value` is not an object.
    pub fn from_model_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |keys: &[&str]| -> String {
            keys.iter()
                .filter_map(|k| obj.get(*k))
                .filter_map(value_as_text)
                .find(|s| !s.is_empty())
                .unwrap_or_else(unknown)
        };
        let date_issued = obj
            .get("date_issued")
            .and_then(value_as_text)
            .filter(|s| !s.is_empty());
        let confidence = obj
            .get("confidence")
            .and_then(coerce_confidence)
            .unwrap_or(DEFAULT_LLM_CONFIDENCE);
        Some(Self {
            student_name: text(&["student_name", "nama_mahasiswa"]),
            event_name: text(&["event_name"]),
            rank_raw: text(&["rank_raw"]),
            level_raw: text(&["level_raw"]),
            category_raw: text(&["category_raw"]),
            domain_raw: text(&["domain_raw"]),
            date_issued,
            confidence,
        })
    }

    /// The raw categorical fields, as snapshotted at scoring time.
    pub fn categories(&self) -> BeforeNormalized {
        BeforeNormalized {
            rank_raw: self.rank_raw.clone(),
            level_raw: self.level_raw.clone(),
            category_raw: self.category_raw.clone(),
        }
    }

    /// Text handed to the embedding model for this certificate.
    pub fn embedding_text(&self) -> String {
        [
            &self.event_name,
            &self.category_raw,
            &self.domain_raw,
            &self.level_raw,
            &self.rank_raw,
        ]
        .iter()
        .filter(|s| !s.is_empty() && s.as_str() != UNKNOWN)
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

fn value_as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeforeNormalized {
    pub rank_raw: String,
    pub level_raw: String,
    pub category_raw: String,
}

/// Ordinals produced by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalized {
    pub rank_norm: u8,
    pub level_norm: u8,
    pub category_norm: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AfterNormalized {
    pub rank_norm: u8,
    pub level_norm: u8,
    pub category_norm: u8,
    pub spu_score: f64,
}

impl AfterNormalized {
    pub fn new(normalized: Normalized, spu_score: f64) -> Self {
        Self {
            rank_norm: normalized.rank_norm,
            level_norm: normalized.level_norm,
            category_norm: normalized.category_norm,
            spu_score,
        }
    }
}

/// A stored certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: Uuid,
    pub document_fingerprint: String,
    pub submitter_id: String,
    pub evidence_url: Option<String>,
    pub status: Status,
    pub parsed: ParsedFields,
    pub before_normalized: Option<BeforeNormalized>,
    pub after_normalized: Option<AfterNormalized>,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl CertificateRecord {
    /// A fresh record in `processed` state, not yet completed.
    pub fn processed(
        document_fingerprint: String,
        submitter_id: String,
        evidence_url: Option<String>,
        parsed: ParsedFields,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_fingerprint,
            submitter_id,
            evidence_url,
            status: Status::Processed,
            parsed,
            before_normalized: None,
            after_normalized: None,
            embedding: None,
            created_at: Utc::now(),
            validated_by: None,
            validated_at: None,
        }
    }

    /// SPU score, `0.0` for records that were never completed.
    pub fn spu_score(&self) -> f64 {
        self.after_normalized
            .map(|a| a.spu_score)
            .filter(|s| s.is_finite())
            .unwrap_or(0.0)
    }
}

/// Fields written by the completion step.
#[derive(Debug, Clone)]
pub struct Completion {
    pub parsed: ParsedFields,
    pub before_normalized: BeforeNormalized,
    pub after_normalized: AfterNormalized,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitterProfile {
    pub id: String,
    pub name: String,
    pub student_number: Option<String>,
    pub program: Option<String>,
    pub faculty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffProfile {
    pub id: String,
    pub name: String,
}

/// A record joined with its submitter's profile, when one exists.
#[derive(Debug, Clone, Serialize)]
pub struct StoredCertificate {
    #[serde(flatten)]
    pub record: CertificateRecord,
    pub submitter: Option<SubmitterProfile>,
}

impl StoredCertificate {
    pub fn submitter_name(&self) -> String {
        self.submitter
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(unknown)
    }

    pub fn student_number(&self) -> String {
        self.submitter
            .as_ref()
            .and_then(|p| p.student_number.clone())
            .unwrap_or_else(unknown)
    }
}

/// Filter for listing records. `None` means "no constraint".
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub submitter_id: Option<String>,
    pub statuses: Option<Vec<Status>>,
}

impl RecordFilter {
    /// Records that take part in ranking: validated or processed.
    pub fn ranked() -> Self {
        Self {
            submitter_id: None,
            statuses: Some(vec![Status::Validated, Status::Processed]),
        }
    }

    pub fn submitter(id: &str) -> Self {
        Self {
            submitter_id: Some(id.to_string()),
            statuses: None,
        }
    }

    pub fn matches(&self, record: &CertificateRecord) -> bool {
        let submitter_ok = self
            .submitter_id
            .as_deref()
            .map_or(true, |s| s == record.submitter_id);
        let status_ok = self
            .statuses
            .as_ref()
            .map_or(true, |set| set.contains(&record.status));
        submitter_ok && status_ok
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub id: Uuid,
    pub document_fingerprint: String,
    pub parsed: ParsedFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    #[serde(alias = "document_id")]
    pub document_fingerprint: String,
    pub parsed: ParsedFields,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub document_fingerprint: String,
    pub parsed: ParsedFields,
    pub before_normalized: BeforeNormalized,
    pub after_normalized: AfterNormalized,
    pub has_embedding: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub id: Uuid,
    pub status: Status,
    pub event_name: String,
    pub student_name: String,
    pub validated_at: DateTime<Utc>,
    pub validated_by: String,
    pub staff: Option<StaffProfile>,
}
