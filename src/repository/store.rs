use crate::entity::{ChatHistory, FragmentDocument, MetadataDocument};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

const STORE_FILE: &str = "knowledge_base.json";

/// All persisted collections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Collections {
    #[serde(default)]
    pub metadata_document: Vec<MetadataDocument>,
    #[serde(default)]
    pub fragment_document: Vec<FragmentDocument>,
    #[serde(default)]
    pub chat_history: Vec<ChatHistory>,
}

/// Shared document store backing every repository.
///
/// Collections live in memory and are written back to a single JSON file
/// after each mutation. Insertion order is preserved.
pub struct Store {
    path: Option<PathBuf>,
    collections: RwLock<Collections>,
}

impl Store {
    /// Open (or create) the store inside `data_dir`
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Arc<Self>> {
        let dir = data_dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

        let path = dir.join(STORE_FILE);
        let collections = if tokio::fs::try_exists(&path).await? {
            let data = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<Collections>(&data)
                .with_context(|| format!("Corrupt knowledge base file {}", path.display()))?
        } else {
            Collections::default()
        };

        info!(
            "Opened knowledge base {} ({} documents, {} fragments, {} chat entries)",
            path.display(),
            collections.metadata_document.len(),
            collections.fragment_document.len(),
            collections.chat_history.len()
        );

        Ok(Arc::new(Store {
            path: Some(path),
            collections: RwLock::new(collections),
        }))
    }

    /// A store that is never written to disk
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Store {
            path: None,
            collections: RwLock::new(Collections::default()),
        })
    }

    pub(crate) async fn read<R>(&self, f: impl FnOnce(&Collections) -> R) -> R {
        let guard = self.collections.read().await;
        f(&*guard)
    }

    /// Mutate the collections and persist the result.
    ///
    /// The change is applied to a copy that only replaces the live
    /// collections once it has been written, so a failed flush changes nothing.
    pub(crate) async fn write<R>(&self, f: impl FnOnce(&mut Collections) -> R) -> Result<R> {
        let mut guard = self.collections.write().await;
        if self.path.is_none() {
            return Ok(f(&mut *guard));
        }

        let mut next = guard.clone();
        let result = f(&mut next);
        self.flush(&next).await?;
        *guard = next;
        Ok(result)
    }

    async fn flush(&self, collections: &Collections) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let data = serde_json::to_string_pretty(collections)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, data)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!("Flushed knowledge base to {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let store = Store::open(dir.path()).await.unwrap();
        store
            .write(|c| {
                c.chat_history
                    .push(ChatHistory::new("conv_1", "hello", "hi there"))
            })
            .await
            .unwrap();
        drop(store);

        let reopened = Store::open(dir.path()).await.unwrap();
        let prompts = reopened
            .read(|c| c.chat_history.iter().map(|h| h.prompt.clone()).collect::<Vec<_>>())
            .await;
        assert_eq!(prompts, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("nested")).await.unwrap();
        let empty = store
            .read(|c| c.metadata_document.is_empty() && c.fragment_document.is_empty())
            .await;
        assert!(empty);
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_collections_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        std::fs::create_dir(dir.path().join("knowledge_base.json.tmp")).unwrap();

        let result = store
            .write(|c| {
                c.chat_history
                    .push(ChatHistory::new("conv_1", "hello", "hi there"))
            })
            .await;

        assert!(result.is_err());
        assert!(store.read(|c| c.chat_history.is_empty()).await);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STORE_FILE), "{ not json").unwrap();
        assert!(Store::open(dir.path()).await.is_err());
    }
}
