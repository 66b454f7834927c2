use super::store::Store;
use super::Repository;
use crate::database::QdrantIndex;
use crate::entity::FragmentDocument;
use crate::similarity::{cosine_similarity, jaccard_similarity, rank};
use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Candidates requested from the native index per wanted result
const NUM_CANDIDATES_FACTOR: usize = 10;

const INDEX_BATCH_SIZE: usize = 100;

/// A fragment together with its similarity to a query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFragment {
    pub fragment: FragmentDocument,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentStats {
    pub total_documents: usize,
    pub total_fragments: usize,
    pub avg_fragments_per_doc: f64,
    pub total_content_length: usize,
}

/// Fragments with their embeddings; optionally mirrored into Qdrant
pub struct FragmentDocumentRepository {
    store: Arc<Store>,
    index: Option<QdrantIndex>,
}

impl FragmentDocumentRepository {
    pub fn new(store: Arc<Store>, index: Option<QdrantIndex>) -> Self {
        FragmentDocumentRepository { store, index }
    }

    pub fn has_native_index(&self) -> bool {
        self.index.is_some()
    }

    /// Store a batch of fragments, indexing them first when an index exists
    pub async fn save_many(&self, fragments: Vec<FragmentDocument>) -> Result<Vec<String>> {
        if fragments.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(index) = &self.index {
            index.upsert(&fragments).await?;
        }

        let ids: Vec<String> = fragments.iter().map(|f| f.id.clone()).collect();
        if let Err(e) = self
            .store
            .write(|c| c.fragment_document.extend(fragments))
            .await
        {
            if let Some(index) = &self.index {
                if let Err(cleanup) = index.delete_points(&ids).await {
                    warn!("Failed to remove unsaved fragments from the index: {:#}", cleanup);
                }
            }
            return Err(e);
        }

        Ok(ids)
    }

    /// Drop the native index and fill it again from the stored fragments.
    /// Returns the number of fragments indexed.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| anyhow!("No vector index is configured"))?;

        if index.collection_exists().await? {
            index.delete_collection().await?;
        }

        let fragments = self.store.read(|c| c.fragment_document.clone()).await;
        for batch in fragments.chunks(INDEX_BATCH_SIZE) {
            index.upsert(batch).await?;
        }
        let indexed = fragments.iter().filter(|f| !f.embedding.is_empty()).count();
        info!("Rebuilt collection {} with {} fragments", index.collection(), indexed);

        Ok(indexed)
    }

    /// Fragments of one metadata document ordered by chunk index
    pub async fn find_by_metadata_document_id(
        &self,
        metadata_document_id: &str,
    ) -> Result<Vec<FragmentDocument>> {
        let mut fragments: Vec<FragmentDocument> = self
            .store
            .read(|c| {
                c.fragment_document
                    .iter()
                    .filter(|f| f.id_metadata_document == metadata_document_id)
                    .cloned()
                    .collect()
            })
            .await;
        fragments.sort_by_key(|f| f.chunk_index);

        Ok(fragments)
    }

    /// Delete every fragment of a metadata document; true if any existed.
    ///
    /// The store is updated first. An index that cannot be updated is only
    /// reported, `rebuild_index` brings it back in line.
    pub async fn delete_by_metadata_document_id(&self, metadata_document_id: &str) -> Result<bool> {
        let deleted = self
            .store
            .write(|c| {
                let before = c.fragment_document.len();
                c.fragment_document
                    .retain(|f| f.id_metadata_document != metadata_document_id);
                c.fragment_document.len() != before
            })
            .await?;

        if let Some(index) = &self.index {
            if let Err(e) = index.delete_by_metadata_document(metadata_document_id).await {
                warn!("Vector index not updated after deleting fragments: {:#}", e);
            }
        }

        Ok(deleted)
    }

    /// Keyword search ranked by word overlap with the query
    pub async fn search_by_text(&self, query: &str, limit: usize) -> Result<Vec<ScoredFragment>> {
        let results = self
            .store
            .read(|c| {
                let scored: Vec<(usize, f32)> = c
                    .fragment_document
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (i, jaccard_similarity(query, &f.content)))
                    .filter(|(_, score)| *score > 0.0)
                    .collect();

                rank(scored, limit)
                    .into_iter()
                    .map(|(i, score)| ScoredFragment {
                        fragment: c.fragment_document[i].clone(),
                        score,
                    })
                    .collect()
            })
            .await;

        Ok(results)
    }

    /// Fragments most similar to `query_embedding`, best first.
    ///
    /// Uses the native index when one is configured, asking it for
    /// `limit * 10` candidates so that fragments rejected by `accept` can be
    /// skipped. If the index fails, or none is configured, every stored
    /// fragment with an embedding is scored by cosine similarity.
    pub async fn vector_search<F>(
        &self,
        query_embedding: &[f32],
        limit: usize,
        accept: F,
    ) -> Result<Vec<ScoredFragment>>
    where
        F: Fn(&FragmentDocument) -> bool,
    {
        if limit == 0 || query_embedding.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(index) = &self.index {
            match index.search(query_embedding, candidate_count(limit)).await {
                Ok(hits) => {
                    let results = self
                        .store
                        .read(|c| resolve_hits(&hits, &c.fragment_document, limit, &accept))
                        .await;
                    return Ok(results);
                }
                Err(e) => warn!(
                    "Vector index search failed, falling back to linear scan: {:#}",
                    e
                ),
            }
        }

        Ok(self.linear_scan(query_embedding, limit, &accept).await)
    }

    async fn linear_scan<F>(&self, query: &[f32], limit: usize, accept: &F) -> Vec<ScoredFragment>
    where
        F: Fn(&FragmentDocument) -> bool,
    {
        self.store
            .read(|c| {
                let scored: Vec<(usize, f32)> = c
                    .fragment_document
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| !f.embedding.is_empty() && accept(*f))
                    .map(|(i, f)| (i, cosine_similarity(query, &f.embedding)))
                    .collect();
                debug!("Linear scan over {} fragments", scored.len());

                rank(scored, limit)
                    .into_iter()
                    .map(|(i, score)| ScoredFragment {
                        fragment: c.fragment_document[i].clone(),
                        score,
                    })
                    .collect()
            })
            .await
    }

    pub async fn fragment_stats(&self) -> Result<FragmentStats> {
        let stats = self
            .store
            .read(|c| {
                let documents: HashSet<&str> = c
                    .fragment_document
                    .iter()
                    .map(|f| f.id_metadata_document.as_str())
                    .collect();
                let total_fragments = c.fragment_document.len();
                let total_documents = documents.len();
                let avg_fragments_per_doc = if total_documents == 0 {
                    0.0
                } else {
                    total_fragments as f64 / total_documents as f64
                };

                FragmentStats {
                    total_documents,
                    total_fragments,
                    avg_fragments_per_doc,
                    total_content_length: c
                        .fragment_document
                        .iter()
                        .map(|f| f.content.chars().count())
                        .sum(),
                }
            })
            .await;

        Ok(stats)
    }
}

/// Number of candidates requested from the native index for `limit` results
fn candidate_count(limit: usize) -> u64 {
    limit.saturating_mul(NUM_CANDIDATES_FACTOR) as u64
}

/// Map index hits back to stored fragments, keeping the index order.
/// Hits whose fragment is no longer stored, or that `accept` rejects, are skipped.
fn resolve_hits<F>(
    hits: &[(String, f32)],
    fragments: &[FragmentDocument],
    limit: usize,
    accept: &F,
) -> Vec<ScoredFragment>
where
    F: Fn(&FragmentDocument) -> bool,
{
    let by_id: HashMap<&str, &FragmentDocument> =
        fragments.iter().map(|f| (f.id.as_str(), f)).collect();

    let mut missing = 0;
    let mut results = Vec::new();
    for (id, score) in hits {
        if results.len() == limit {
            break;
        }
        match by_id.get(id.as_str()) {
            Some(fragment) if accept(*fragment) => results.push(ScoredFragment {
                fragment: (*fragment).clone(),
                score: *score,
            }),
            Some(_) => {}
            None => missing += 1,
        }
    }

    if missing > 0 {
        debug!("{} indexed fragments are no longer stored", missing);
    }
    results
}

impl Repository for FragmentDocumentRepository {
    type Entity = FragmentDocument;

    async fn find_by_id(&self, id: &str) -> Result<Option<FragmentDocument>> {
        Ok(self
            .store
            .read(|c| c.fragment_document.iter().find(|f| f.id == id).cloned())
            .await)
    }

    async fn save(&self, entity: FragmentDocument) -> Result<String> {
        let exists = self
            .store
            .read(|c| c.fragment_document.iter().any(|f| f.id == entity.id))
            .await;
        if exists {
            return Err(anyhow!("Fragment {} already exists", entity.id));
        }

        let mut ids = self.save_many(vec![entity]).await?;
        ids.pop()
            .ok_or_else(|| anyhow!("Fragment was not stored"))
    }

    async fn update<F>(&self, id: &str, change: F) -> Result<bool>
    where
        F: FnOnce(&mut FragmentDocument),
    {
        let updated = self
            .store
            .write(|c| match c.fragment_document.iter_mut().find(|f| f.id == id) {
                Some(fragment) => {
                    change(fragment);
                    fragment.updated_at = Utc::now();
                    Some(fragment.clone())
                }
                None => None,
            })
            .await?;

        match (updated, &self.index) {
            (Some(fragment), Some(index)) => {
                index.upsert(std::slice::from_ref(&fragment)).await?;
                Ok(true)
            }
            (Some(_), None) => Ok(true),
            (None, _) => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self
            .store
            .write(|c| {
                let before = c.fragment_document.len();
                c.fragment_document.retain(|f| f.id != id);
                c.fragment_document.len() != before
            })
            .await?;

        if deleted {
            if let Some(index) = &self.index {
                if let Err(e) = index.delete_points(&[id.to_string()]).await {
                    warn!("Vector index not updated after deleting fragment {}: {:#}", id, e);
                }
            }
        }

        Ok(deleted)
    }

    /// Ordered by metadata document, then chunk index
    async fn find_all(&self) -> Result<Vec<FragmentDocument>> {
        let mut fragments = self.store.read(|c| c.fragment_document.clone()).await;
        fragments.sort_by(|a, b| {
            a.id_metadata_document
                .cmp(&b.id_metadata_document)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });

        Ok(fragments)
    }
}
