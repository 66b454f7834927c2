//! Repository layer over the shared [`Store`].
//!
//! Each repository owns one collection. The optional Qdrant index is only
//! consulted by the fragment repository.

mod chat_history;
mod fragment;
mod metadata;
mod store;

use anyhow::Result;

pub use chat_history::{ChatHistoryRepository, ConversationSummary};
pub use fragment::{FragmentDocumentRepository, FragmentStats, ScoredFragment};
pub use metadata::{DocumentStats, DocumentTypeStats, MetadataDocumentRepository};
pub use store::Store;

/// Common CRUD operations shared by every repository
#[allow(async_fn_in_trait)]
pub trait Repository {
    type Entity;

    /// Find an entity by id
    async fn find_by_id(&self, id: &str) -> Result<Option<Self::Entity>>;

    /// Insert an entity and return its id
    async fn save(&self, entity: Self::Entity) -> Result<String>;

    /// Apply `change` to the entity with `id`; false if it does not exist
    async fn update<F>(&self, id: &str, change: F) -> Result<bool>
    where
        F: FnOnce(&mut Self::Entity);

    /// Delete an entity; false if it does not exist
    async fn delete(&self, id: &str) -> Result<bool>;

    /// All entities in the repository's natural order
    async fn find_all(&self) -> Result<Vec<Self::Entity>>;
}
