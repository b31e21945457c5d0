//! In-process [`CertificateStore`] backing the lifecycle and handler tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::db::CertificateStore;
use crate::dto::{
    CertificateRecord, Completion, RecordFilter, StaffProfile, Status, StoredCertificate,
    SubmitterProfile,
};
use crate::error::{AppError, Result};

#[derive(Default)]
struct Tables {
    certificates: Vec<CertificateRecord>,
    submitters: HashMap<String, SubmitterProfile>,
    staff: HashMap<String, StaffProfile>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_submitter(&self, profile: SubmitterProfile) {
        self.inner
            .write()
            .submitters
            .insert(profile.id.clone(), profile);
    }

    pub fn add_staff(&self, profile: StaffProfile) {
        self.inner.write().staff.insert(profile.id.clone(), profile);
    }

    pub fn len(&self) -> usize {
        self.inner.read().certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn join(tables: &Tables, record: &CertificateRecord) -> StoredCertificate {
        StoredCertificate {
            record: record.clone(),
            submitter: tables.submitters.get(&record.submitter_id).cloned(),
        }
    }
}

#[async_trait(?Send)]
impl CertificateStore for MemoryStore {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<CertificateRecord>> {
        Ok(self
            .inner
            .read()
            .certificates
            .iter()
            .find(|r| r.document_fingerprint == fingerprint)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StoredCertificate>> {
        let tables = self.inner.read();
        Ok(tables
            .certificates
            .iter()
            .find(|r| r.id == id)
            .map(|r| Self::join(&tables, r)))
    }

    async fn insert(&self, record: &CertificateRecord) -> Result<()> {
        let mut tables = self.inner.write();
        if tables
            .certificates
            .iter()
            .any(|r| r.document_fingerprint == record.document_fingerprint)
        {
            return Err(AppError::DuplicateContent {
                fingerprint: record.document_fingerprint.clone(),
            });
        }
        tables.certificates.push(record.clone());
        Ok(())
    }

    async fn save_completion(&self, fingerprint: &str, completion: &Completion) -> Result<bool> {
        let mut tables = self.inner.write();
        let Some(record) = tables
            .certificates
            .iter_mut()
            .find(|r| r.document_fingerprint == fingerprint && r.status == Status::Processed)
        else {
            return Ok(false);
        };
        record.parsed = completion.parsed.clone();
        record.before_normalized = Some(completion.before_normalized.clone());
        record.after_normalized = Some(completion.after_normalized);
        record.embedding = completion.embedding.clone();
        Ok(true)
    }

    async fn mark_validated(&self, id: Uuid, staff_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.inner.write();
        match tables
            .certificates
            .iter_mut()
            .find(|r| r.id == id && r.status == Status::Processed)
        {
            Some(record) => {
                record.status = Status::Validated;
                record.validated_by = Some(staff_id.to_string());
                record.validated_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredCertificate>> {
        let tables = self.inner.read();
        let mut rows: Vec<StoredCertificate> = tables
            .certificates
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| Self::join(&tables, r))
            .collect();
        // newest first; stable so equal timestamps keep insertion order
        rows.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        Ok(rows)
    }

    async fn staff(&self, id: &str) -> Result<Option<StaffProfile>> {
        Ok(self.inner.read().staff.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::ParsedFields;

    fn record(fp: &str, submitter: &str) -> CertificateRecord {
        CertificateRecord::processed(fp.into(), submitter.into(), None, ParsedFields::unknown(0.5))
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_fingerprint() {
        let store = MemoryStore::new();
        store.insert(&record("a", "s1")).await.unwrap();
        let err = store.insert(&record("a", "s2")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateContent { fingerprint } if fingerprint == "a"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn validation_is_conditional() {
        let store = MemoryStore::new();
        let rec = record("a", "s1");
        store.insert(&rec).await.unwrap();
        assert!(store.mark_validated(rec.id, "staff", Utc::now()).await.unwrap());
        assert!(!store.mark_validated(rec.id, "staff", Utc::now()).await.unwrap());
        assert!(!store.mark_validated(Uuid::new_v4(), "staff", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn completion_skips_validated_records() {
        let store = MemoryStore::new();
        let rec = record("a", "s1");
        store.insert(&rec).await.unwrap();
        store.mark_validated(rec.id, "staff", Utc::now()).await.unwrap();

        let mut parsed = ParsedFields::unknown(0.9);
        parsed.event_name = "Rewritten".into();
        let completion = Completion {
            before_normalized: parsed.categories(),
            after_normalized: crate::dto::AfterNormalized {
                rank_norm: 5,
                level_norm: 5,
                category_norm: 2,
                spu_score: 1.0,
            },
            embedding: None,
            parsed,
        };
        assert!(!store.save_completion("a", &completion).await.unwrap());
        let stored = store.find_by_fingerprint("a").await.unwrap().unwrap();
        assert_eq!(stored.parsed.event_name, "Unknown");
        assert!(stored.after_normalized.is_none());
    }

    #[tokio::test]
    async fn list_joins_profiles_and_filters() {
        let store = MemoryStore::new();
        store.add_submitter(SubmitterProfile {
            id: "s1".into(),
            name: "Budi".into(),
            student_number: Some("123".into()),
            program: None,
            faculty: None,
        });
        store.insert(&record("a", "s1")).await.unwrap();
        store.insert(&record("b", "s2")).await.unwrap();

        let all = store.list(&RecordFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = store.list(&RecordFilter::submitter("s1")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].submitter_name(), "Budi");

        let other = store.list(&RecordFilter::submitter("s2")).await.unwrap();
        assert_eq!(other[0].submitter_name(), "Unknown");
    }
}
