use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Generate a fresh record identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Descriptive record for an ingested source document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataDocument {
    pub id: String,
    pub document_title: String,
    /// Free-form metadata (specialty, source, keywords, file name, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub document_type: String,
    #[serde(default = "default_valid")]
    pub valid: bool,
    #[serde(default = "default_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_valid() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

impl MetadataDocument {
    pub fn new(
        document_title: impl Into<String>,
        document_type: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        MetadataDocument {
            id: new_id(),
            document_title: document_title.into(),
            metadata,
            document_type: document_type.into(),
            valid: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge new keys into the metadata map
    pub fn update_metadata(&mut self, new_metadata: Map<String, Value>) {
        self.metadata.extend(new_metadata);
        self.updated_at = Utc::now();
    }

    pub fn mark_invalid(&mut self) {
        self.valid = false;
        self.updated_at = Utc::now();
    }

    pub fn increment_version(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// A chunk of a source document together with its embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FragmentDocument {
    pub id: String,
    /// Id of the owning `MetadataDocument`
    pub id_metadata_document: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FragmentDocument {
    pub fn new(
        id_metadata_document: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        FragmentDocument {
            id: new_id(),
            id_metadata_document: id_metadata_document.into(),
            chunk_index,
            content: content.into(),
            embedding,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_content(&mut self, new_content: impl Into<String>, new_embedding: Vec<f32>) {
        self.content = new_content.into();
        self.embedding = new_embedding;
        self.updated_at = Utc::now();
    }

    /// First `length` characters of the content, with an ellipsis when cut
    pub fn content_preview(&self, length: usize) -> String {
        if self.content.chars().count() > length {
            let preview: String = self.content.chars().take(length).collect();
            format!("{}...", preview)
        } else {
            self.content.clone()
        }
    }
}

/// One prompt/response exchange of a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatHistory {
    pub id: String,
    pub conversation_id: String,
    pub prompt: String,
    pub response: String,
    pub date: DateTime<Utc>,
}

impl ChatHistory {
    pub fn new(
        conversation_id: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        ChatHistory {
            id: new_id(),
            conversation_id: conversation_id.into(),
            prompt: prompt.into(),
            response: response.into(),
            date: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_preview() {
        let fragment = FragmentDocument::new("doc", 0, "Migraña con aura", vec![]);
        assert_eq!(fragment.content_preview(7), "Migraña...");
        assert_eq!(fragment.content_preview(100), "Migraña con aura");
    }

    #[test]
    fn test_metadata_lifecycle() {
        let mut doc = MetadataDocument::new("Guide", "neurology", Map::new());
        assert!(doc.valid);
        assert_eq!(doc.version, 1);

        let mut extra = Map::new();
        extra.insert("specialty".into(), json!("neurology"));
        doc.update_metadata(extra);
        doc.increment_version();
        doc.mark_invalid();

        assert_eq!(doc.metadata["specialty"], json!("neurology"));
        assert_eq!(doc.version, 2);
        assert!(!doc.valid);
        assert!(doc.updated_at >= doc.created_at);
    }

    #[test]
    fn test_metadata_defaults_when_missing() {
        let raw = json!({
            "id": "m1",
            "document_title": "Old record",
            "document_type": "medical",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        });
        let doc: MetadataDocument = serde_json::from_value(raw).unwrap();
        assert!(doc.valid);
        assert_eq!(doc.version, 1);
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn test_update_content_replaces_embedding() {
        let mut fragment = FragmentDocument::new("doc", 3, "old", vec![1.0]);
        fragment.update_content("new", vec![0.5, 0.5]);
        assert_eq!(fragment.content, "new");
        assert_eq!(fragment.embedding, vec![0.5, 0.5]);
    }
}
