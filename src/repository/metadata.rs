use super::store::Store;
use super::Repository;
use crate::entity::MetadataDocument;
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per document type counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentTypeStats {
    pub document_type: String,
    pub count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStats {
    pub by_type: Vec<DocumentTypeStats>,
    pub total: usize,
    pub valid_total: usize,
    pub invalid_total: usize,
}

pub struct MetadataDocumentRepository {
    store: Arc<Store>,
}

impl MetadataDocumentRepository {
    pub fn new(store: Arc<Store>) -> Self {
        MetadataDocumentRepository { store }
    }

    /// Every document, including invalidated ones, newest first
    pub async fn find_all_including_invalid(&self) -> Result<Vec<MetadataDocument>> {
        Ok(self.newest_first(|_| true).await)
    }

    pub async fn find_by_document_type(&self, document_type: &str) -> Result<Vec<MetadataDocument>> {
        Ok(self
            .newest_first(|d| d.valid && d.document_type == document_type)
            .await)
    }

    /// Valid documents whose title contains `pattern`, ignoring case
    pub async fn find_by_title_pattern(&self, pattern: &str) -> Result<Vec<MetadataDocument>> {
        let needle = pattern.to_lowercase();
        Ok(self
            .newest_first(|d| d.valid && d.document_title.to_lowercase().contains(&needle))
            .await)
    }

    /// Soft delete: the document stays stored but stops being served
    pub async fn mark_as_invalid(&self, id: &str) -> Result<bool> {
        self.update(id, |doc| doc.mark_invalid()).await
    }

    pub async fn document_stats(&self) -> Result<DocumentStats> {
        let stats = self
            .store
            .read(|c| {
                let mut by_type: BTreeMap<&str, DocumentTypeStats> = BTreeMap::new();
                for doc in &c.metadata_document {
                    let entry =
                        by_type
                            .entry(doc.document_type.as_str())
                            .or_insert_with(|| DocumentTypeStats {
                                document_type: doc.document_type.clone(),
                                count: 0,
                                valid_count: 0,
                                invalid_count: 0,
                            });
                    entry.count += 1;
                    if doc.valid {
                        entry.valid_count += 1;
                    } else {
                        entry.invalid_count += 1;
                    }
                }

                let mut by_type: Vec<DocumentTypeStats> = by_type.into_values().collect();
                by_type.sort_by(|a, b| b.count.cmp(&a.count));

                let valid_total = c.metadata_document.iter().filter(|d| d.valid).count();
                DocumentStats {
                    by_type,
                    total: c.metadata_document.len(),
                    valid_total,
                    invalid_total: c.metadata_document.len() - valid_total,
                }
            })
            .await;

        Ok(stats)
    }

    async fn newest_first<F>(&self, predicate: F) -> Vec<MetadataDocument>
    where
        F: Fn(&MetadataDocument) -> bool,
    {
        let mut docs: Vec<MetadataDocument> = self
            .store
            .read(|c| {
                c.metadata_document
                    .iter()
                    .filter(|d| predicate(d))
                    .cloned()
                    .collect()
            })
            .await;
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs
    }
}

impl Repository for MetadataDocumentRepository {
    type Entity = MetadataDocument;

    async fn find_by_id(&self, id: &str) -> Result<Option<MetadataDocument>> {
        Ok(self
            .store
            .read(|c| c.metadata_document.iter().find(|d| d.id == id).cloned())
            .await)
    }

    async fn save(&self, entity: MetadataDocument) -> Result<String> {
        let id = entity.id.clone();
        let inserted = self
            .store
            .write(|c| {
                if c.metadata_document.iter().any(|d| d.id == entity.id) {
                    return false;
                }
                c.metadata_document.push(entity);
                true
            })
            .await?;

        if !inserted {
            return Err(anyhow!("Metadata document {} already exists", id));
        }
        Ok(id)
    }

    async fn update<F>(&self, id: &str, change: F) -> Result<bool>
    where
        F: FnOnce(&mut MetadataDocument),
    {
        self.store
            .write(|c| match c.metadata_document.iter_mut().find(|d| d.id == id) {
                Some(doc) => {
                    change(doc);
                    doc.updated_at = Utc::now();
                    true
                }
                None => false,
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.store
            .write(|c| {
                let before = c.metadata_document.len();
                c.metadata_document.retain(|d| d.id != id);
                c.metadata_document.len() != before
            })
            .await
    }

    /// Valid documents only, newest first
    async fn find_all(&self) -> Result<Vec<MetadataDocument>> {
        Ok(self.newest_first(|d| d.valid).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::Map;

    fn doc(title: &str, doc_type: &str, age_minutes: i64) -> MetadataDocument {
        let mut doc = MetadataDocument::new(title, doc_type, Map::new());
        doc.created_at = Utc::now() - Duration::minutes(age_minutes);
        doc
    }

    #[tokio::test]
    async fn test_find_all_skips_invalid_and_sorts_newest_first() {
        let repo = MetadataDocumentRepository::new(Store::in_memory());
        let old = repo.save(doc("Old guide", "neurology", 10)).await.unwrap();
        let new = repo.save(doc("New guide", "neurology", 1)).await.unwrap();
        let gone = repo.save(doc("Retired", "neurology", 5)).await.unwrap();
        assert!(repo.mark_as_invalid(&gone).await.unwrap());

        let ids: Vec<String> = repo.find_all().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![new, old]);
        assert_eq!(repo.find_all_including_invalid().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_title_pattern_is_case_insensitive() {
        let repo = MetadataDocumentRepository::new(Store::in_memory());
        repo.save(doc("Protocol: Pneumonia", "pulmonology", 0)).await.unwrap();
        repo.save(doc("Manual: Diabetes", "endocrinology", 0)).await.unwrap();

        let found = repo.find_by_title_pattern("PNEUMO").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].document_title, "Protocol: Pneumonia");
    }

    #[tokio::test]
    async fn test_duplicate_save_is_rejected() {
        let repo = MetadataDocumentRepository::new(Store::in_memory());
        let d = doc("Guide", "medical", 0);
        repo.save(d.clone()).await.unwrap();
        assert!(repo.save(d).await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_ids() {
        let repo = MetadataDocumentRepository::new(Store::in_memory());
        assert!(!repo.update("missing", |d| d.increment_version()).await.unwrap());
        assert!(!repo.delete("missing").await.unwrap());
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_stats() {
        let repo = MetadataDocumentRepository::new(Store::in_memory());
        repo.save(doc("a", "neurology", 0)).await.unwrap();
        repo.save(doc("b", "neurology", 0)).await.unwrap();
        let c = repo.save(doc("c", "pulmonology", 0)).await.unwrap();
        repo.mark_as_invalid(&c).await.unwrap();

        let stats = repo.document_stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.valid_total, 2);
        assert_eq!(stats.invalid_total, 1);
        assert_eq!(stats.by_type[0].document_type, "neurology");
        assert_eq!(stats.by_type[0].count, 2);
        assert_eq!(stats.by_type[1].invalid_count, 1);
    }
}
