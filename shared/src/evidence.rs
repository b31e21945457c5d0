//! Storage of the uploaded certificate files ("evidence").

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

#[async_trait(?Send)]
pub trait EvidenceStore: Send + Sync {
    /// Stores `bytes` under `path` and returns the public URL.
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<String>;

    /// Deletes evidence written by [`EvidenceStore::upload`].
    async fn remove(&self, path: &str) -> Result<()>;
}

/// `uploads/{YYYYMMDD}_{32 hex}{ext}`, keeping the original extension.
pub fn evidence_path(filename: &str, now: DateTime<Utc>) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!(
        "uploads/{}_{}{}",
        now.format("%Y%m%d"),
        Uuid::new_v4().simple(),
        ext
    )
}

/// Writes evidence below a local directory served under `public_base`.
#[derive(Debug, Clone)]
pub struct LocalEvidenceStore {
    root: PathBuf,
    public_base: String,
}

impl LocalEvidenceStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait(?Send)]
impl EvidenceStore for LocalEvidenceStore {
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<String> {
        let target = self.root.join(path);
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        info!(path, size = bytes.len(), "stored evidence");
        Ok(format!("{}/{}", self.public_base, path))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        tokio::fs::remove_file(self.root.join(path)).await?;
        info!(path, "removed evidence");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn path_convention() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        let p = evidence_path("Sertifikat Juara.PNG", now);
        assert!(p.starts_with("uploads/20240307_"));
        assert!(p.ends_with(".PNG"));
        let hex = &p["uploads/20240307_".len()..p.len() - 4];
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

        let bare = evidence_path("noext", now);
        assert_eq!(bare.len(), "uploads/20240307_".len() + 32);
    }

    #[tokio::test]
    async fn local_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalEvidenceStore::new(dir.path(), "http://files.local/evidence/");
        let url = store.upload(b"png-bytes", "uploads/x.png").await.unwrap();
        assert_eq!(url, "http://files.local/evidence/uploads/x.png");
        let written = std::fs::read(dir.path().join("uploads/x.png")).unwrap();
        assert_eq!(written, b"png-bytes");

        store.remove("uploads/x.png").await.unwrap();
        assert!(!dir.path().join("uploads/x.png").exists());
        assert!(store.remove("uploads/x.png").await.is_err());
    }
}
