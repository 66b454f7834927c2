use crate::entity::FragmentDocument;
use anyhow::{Context, Result};
use log::{debug, info};
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder, VectorParams,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

pub const DEFAULT_COLLECTION: &str = "fragment_document";

/// Configuration for Qdrant
#[derive(Debug, Clone, PartialEq)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl QdrantConfig {
    /// Build the configuration from a variable lookup.
    /// Returns `None` when no `QDRANT_URL` is set.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("QDRANT_URL").filter(|u| !u.trim().is_empty())?;
        let api_key = lookup("QDRANT_API_KEY").filter(|k| !k.is_empty());
        let collection = lookup("VECTOR_SEARCH_INDEX")
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());

        Some(QdrantConfig {
            url,
            api_key,
            collection,
        })
    }
}

/// Native vector index mirroring the stored fragment embeddings
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    ready: AtomicBool,
}

impl QdrantIndex {
    /// Create a new Qdrant index client
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .with_context(|| format!("Failed to connect to Qdrant at {}", config.url))?;

        Ok(QdrantIndex {
            client,
            collection: config.collection,
            ready: AtomicBool::new(false),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        match self.client.collection_info(&self.collection).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to check collection existence: {}",
                e
            )),
        }
    }

    /// Create the collection for vectors of `dimension` if it is missing
    pub async fn ensure_collection(&self, dimension: u64) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        if !self.collection_exists().await? {
            let create_collection = CreateCollectionBuilder::new(self.collection.clone())
                .vectors_config(VectorParams {
                    size: dimension,
                    distance: Distance::Cosine.into(),
                    ..Default::default()
                });

            self.client
                .create_collection(create_collection)
                .await
                .with_context(|| format!("Failed to create collection {}", self.collection))?;
            info!(
                "Created vector collection {} ({} dimensions)",
                self.collection, dimension
            );
        }

        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Delete the whole collection
    pub async fn delete_collection(&self) -> Result<()> {
        self.client
            .delete_collection(self.collection.clone())
            .await
            .with_context(|| format!("Failed to delete collection {}", self.collection))?;
        self.ready.store(false, Ordering::Release);

        Ok(())
    }

    /// Index fragments, keyed by their ids
    pub async fn upsert(&self, fragments: &[FragmentDocument]) -> Result<()> {
        let Some(first) = fragments.iter().find(|f| !f.embedding.is_empty()) else {
            return Ok(());
        };
        self.ensure_collection(first.embedding.len() as u64).await?;

        let mut points = Vec::with_capacity(fragments.len());
        for fragment in fragments.iter().filter(|f| !f.embedding.is_empty()) {
            let payload = Payload::try_from(json!({
                "id_metadata_document": fragment.id_metadata_document,
                "chunk_index": fragment.chunk_index,
                "content": fragment.content,
            }))
            .context("Failed to build point payload")?;

            points.push(PointStruct::new(
                fragment.id.clone(),
                fragment.embedding.clone(),
                payload,
            ));
        }

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.clone(), points).wait(true))
            .await
            .with_context(|| {
                format!("Failed to upsert points in collection {}", self.collection)
            })?;
        debug!("Indexed {} fragments in {}", count, self.collection);

        Ok(())
    }

    /// Nearest fragments to `vector`, as `(fragment_id, score)` best first
    pub async fn search(&self, vector: &[f32], limit: u64) -> Result<Vec<(String, f32)>> {
        let request = SearchPointsBuilder::new(self.collection.clone(), vector.to_vec(), limit);

        let response = self
            .client
            .search_points(request)
            .await
            .with_context(|| format!("Failed to search collection {}", self.collection))?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| point_id_to_string(point.id).map(|id| (id, point.score)))
            .collect();

        Ok(hits)
    }

    /// Remove individual fragments from the index
    pub async fn delete_points(&self, fragment_ids: &[String]) -> Result<()> {
        if fragment_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<PointId> = fragment_ids.iter().cloned().map(PointId::from).collect();
        let result = self
            .client
            .delete_points(
                DeletePointsBuilder::new(self.collection.clone())
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("Collection {} does not exist, nothing to delete", self.collection);
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to delete points from {}", self.collection))),
        }
    }

    /// Remove every fragment belonging to a metadata document
    pub async fn delete_by_metadata_document(&self, metadata_document_id: &str) -> Result<()> {
        let filter = Filter::must([Condition::matches(
            "id_metadata_document",
            metadata_document_id.to_string(),
        )]);

        let result = self
            .client
            .delete_points(
                DeletePointsBuilder::new(self.collection.clone())
                    .points(filter)
                    .wait(true),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("Collection {} does not exist, nothing to delete", self.collection);
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context(format!(
                "Failed to delete fragments of {} from {}",
                metadata_document_id, self.collection
            ))),
        }
    }
}

fn is_not_found(error: &QdrantError) -> bool {
    matches!(error, QdrantError::ResponseError { status } if status.code() == tonic::Code::NotFound)
}

fn point_id_to_string(id: Option<PointId>) -> Option<String> {
    match id?.point_id_options? {
        PointIdOptions::Uuid(uuid) => Some(uuid),
        PointIdOptions::Num(num) => Some(num.to_string()),
    }
}
