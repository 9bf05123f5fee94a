use crate::core::hash_key::HashKey;
use crate::storage::ingest::{self, IngestFormat};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Source of a full suppression snapshot to build an engine from
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self) -> Result<Vec<HashKey>>;

    fn describe(&self) -> String;
}

/// Authoritative suppression store owned by the CRUD layer
#[async_trait]
pub trait SuppressionRepository: Send + Sync {
    /// Every suppressed address of an organization
    async fn all_emails(&self, org_id: &str) -> Result<Vec<String>>;
}

/// Snapshot read from a bulk export file
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
    format: IngestFormat,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>, format: IngestFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshot {
    async fn load(&self) -> Result<Vec<HashKey>> {
        let path = self.path.clone();
        let format = self.format;
        let report = tokio::task::spawn_blocking(move || ingest::load_file(&path, format))
            .await
            .context("Ingestion task panicked")?
            .with_context(|| format!("Failed to ingest {}", self.path.display()))?;
        Ok(report.keys)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Snapshot exported from a [`SuppressionRepository`] for one organization
pub struct RepositorySnapshot<R> {
    repository: Arc<R>,
    org_id: String,
}

impl<R: SuppressionRepository> RepositorySnapshot<R> {
    pub fn new(repository: Arc<R>, org_id: impl Into<String>) -> Self {
        Self {
            repository,
            org_id: org_id.into(),
        }
    }
}

#[async_trait]
impl<R: SuppressionRepository + 'static> SnapshotSource for RepositorySnapshot<R> {
    async fn load(&self) -> Result<Vec<HashKey>> {
        let emails = self
            .repository
            .all_emails(&self.org_id)
            .await
            .with_context(|| format!("Failed to export suppressions for org {}", self.org_id))?;
        info!(
            "Exported {} suppressed addresses for org {}",
            emails.len(),
            self.org_id
        );
        Ok(emails.iter().map(|e| HashKey::from_email(e)).collect())
    }

    fn describe(&self) -> String {
        format!("repository:{}", self.org_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::io::Write;

    struct StaticRepository;

    #[async_trait]
    impl SuppressionRepository for StaticRepository {
        async fn all_emails(&self, org_id: &str) -> Result<Vec<String>> {
            match org_id {
                "acme" => Ok(vec!["A@X.com".to_string(), "b@x.com ".to_string()]),
                _ => Err(anyhow!("unknown org {}", org_id)),
            }
        }
    }

    #[tokio::test]
    async fn test_repository_snapshot_hashes_addresses() {
        let source = RepositorySnapshot::new(Arc::new(StaticRepository), "acme");
        let keys = source.load().await.unwrap();

        assert_eq!(
            keys,
            vec![HashKey::from_email("a@x.com"), HashKey::from_email("b@x.com")]
        );
        assert_eq!(source.describe(), "repository:acme");
    }

    #[tokio::test]
    async fn test_repository_snapshot_error() {
        let source = RepositorySnapshot::new(Arc::new(StaticRepository), "globex");
        let err = source.load().await.unwrap_err();
        assert!(err.to_string().contains("globex"));
    }

    #[tokio::test]
    async fn test_file_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a@x.com").unwrap();
        writeln!(file, "deadbeefdeadbeefdeadbeefdeadbeef").unwrap();
        writeln!(file, "# trailer").unwrap();

        let source = FileSnapshot::new(file.path(), IngestFormat::Plain);
        let keys = source.load().await.unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_file_snapshot_missing() {
        let source = FileSnapshot::new("/nonexistent/export.csv", IngestFormat::Auto);
        assert!(source.load().await.is_err());
    }
}
