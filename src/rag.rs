use crate::chunking::{split_into_fragments, ChunkingConfig};
use crate::document::Document;
use crate::embeddings::Embedder;
use crate::entity::{FragmentDocument, MetadataDocument};
use crate::generation::{medical_prompt, Generator};
use crate::repository::{
    DocumentStats, FragmentDocumentRepository, FragmentStats, MetadataDocumentRepository,
    Repository, ScoredFragment,
};
use crate::seed::sample_documents;
use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_TITLE: &str = "Untitled Medical Document";
pub const DEFAULT_DOCUMENT_TYPE: &str = "medical";

/// Raw text to be added to the knowledge base
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub text: String,
    pub title: Option<String>,
    pub document_type: Option<String>,
    pub metadata: Map<String, Value>,
}

impl SourceDocument {
    pub fn new(text: impl Into<String>) -> Self {
        SourceDocument {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Documents stored by one `add_documents` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub documents: Vec<IngestedDocument>,
    pub total_fragments: usize,
}

/// Result of storing one source document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedDocument {
    pub metadata_id: String,
    pub title: String,
    pub fragment_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedFile {
    pub file_name: String,
    pub metadata_id: String,
    pub extension: String,
    pub fragment_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileError {
    pub file_name: String,
    pub error: String,
}

/// Outcome of a batch of files; failures never abort the batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessReport {
    pub processed_documents: Vec<ProcessedFile>,
    pub errors: Vec<FileError>,
    pub total_fragments: usize,
}

/// A retrieved fragment with the title of its document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextDocument {
    pub content: String,
    pub fragment_id: String,
    pub metadata_document_id: String,
    pub chunk_index: usize,
    pub document_title: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<ContextDocument>,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeBaseStats {
    pub documents: DocumentStats,
    pub fragments: FragmentStats,
}

/// Retrieval-augmented generation over the medical knowledge base
pub struct RagService<E> {
    metadata: MetadataDocumentRepository,
    fragments: FragmentDocumentRepository,
    embedder: E,
    chunking: ChunkingConfig,
}

impl<E: Embedder> RagService<E> {
    pub fn new(
        metadata: MetadataDocumentRepository,
        fragments: FragmentDocumentRepository,
        embedder: E,
        chunking: ChunkingConfig,
    ) -> Self {
        RagService {
            metadata,
            fragments,
            embedder,
            chunking,
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Chunk, embed and store one document.
    ///
    /// Every fragment is embedded before anything is written, so a failing
    /// embedding service leaves no trace of the document.
    pub async fn add_document(&self, source: SourceDocument) -> Result<IngestedDocument> {
        let title = non_blank(source.title).unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let document_type =
            non_blank(source.document_type).unwrap_or_else(|| DEFAULT_DOCUMENT_TYPE.to_string());

        let chunks = split_into_fragments(&source.text, &self.chunking);
        if chunks.is_empty() {
            return Err(anyhow!("Document '{}' contains no text", title));
        }
        info!("Split '{}' into {} fragments", title, chunks.len());

        let mut metadata = source.metadata;
        metadata.insert("fragment_count".into(), Value::from(chunks.len()));
        metadata.insert(
            "embedding_model".into(),
            Value::from(self.embedder.model_name()),
        );
        let metadata_document = MetadataDocument::new(title.clone(), document_type, metadata);

        let mut fragments = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = self
                .embedder
                .embed(&chunk.text)
                .await
                .with_context(|| {
                    format!("Failed to embed fragment {} of '{}'", chunk.index, title)
                })?;
            fragments.push(FragmentDocument::new(
                &metadata_document.id,
                chunk.index,
                chunk.text,
                embedding.values,
            ));
        }

        let metadata_id = self.metadata.save(metadata_document).await?;
        let fragment_ids = match self.fragments.save_many(fragments).await {
            Ok(ids) => ids,
            Err(e) => {
                if let Err(cleanup) = self.metadata.delete(&metadata_id).await {
                    warn!(
                        "Failed to remove metadata document {}: {:#}",
                        metadata_id, cleanup
                    );
                }
                return Err(e.context(format!("Failed to store fragments of '{}'", title)));
            }
        };

        info!(
            "Stored '{}' as {} with {} fragments",
            title,
            metadata_id,
            fragment_ids.len()
        );

        Ok(IngestedDocument {
            metadata_id,
            title,
            fragment_ids,
        })
    }

    /// Add documents in order, stopping at the first failure
    pub async fn add_documents(&self, sources: Vec<SourceDocument>) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        for source in sources {
            let ingested = self.add_document(source).await?;
            report.total_fragments += ingested.fragment_ids.len();
            report.documents.push(ingested);
        }
        Ok(report)
    }

    /// Read, chunk and store files from disk, collecting per-file errors
    pub async fn process_files(
        &self,
        paths: &[PathBuf],
        document_type: &str,
        specialty: Option<&str>,
        description: Option<&str>,
    ) -> ProcessReport {
        let mut report = ProcessReport::default();

        for path in paths {
            let file_name = display_name(path);
            match self
                .process_file(path, document_type, specialty, description)
                .await
            {
                Ok(processed) => {
                    report.total_fragments += processed.fragment_count;
                    report.processed_documents.push(processed);
                }
                Err(e) => {
                    warn!("Failed to process {}: {:#}", file_name, e);
                    report.errors.push(FileError {
                        file_name,
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        info!(
            "Processed {} files ({} failed, {} fragments)",
            report.processed_documents.len(),
            report.errors.len(),
            report.total_fragments
        );
        report
    }

    async fn process_file(
        &self,
        path: &Path,
        document_type: &str,
        specialty: Option<&str>,
        description: Option<&str>,
    ) -> Result<ProcessedFile> {
        let owned = path.to_path_buf();
        let document = tokio::task::spawn_blocking(move || Document::from_file(owned))
            .await
            .context("File reader task failed")??;

        if document.content.trim().is_empty() {
            return Err(anyhow!("No text could be extracted from {}", document.title));
        }

        let mut metadata = Map::new();
        metadata.insert("file_name".into(), Value::from(document.title.clone()));
        metadata.insert("extension".into(), Value::from(document.extension.clone()));
        metadata.insert("mime_type".into(), Value::from(document.mime_type.clone()));
        metadata.insert(
            "content_length".into(),
            Value::from(document.content.chars().count()),
        );
        if let Some(specialty) = specialty {
            metadata.insert("specialty".into(), Value::from(specialty));
        }
        if let Some(description) = description {
            metadata.insert("description".into(), Value::from(description));
        }

        let ingested = self
            .add_document(SourceDocument {
                text: document.content,
                title: Some(document.title.clone()),
                document_type: Some(document_type.to_string()),
                metadata,
            })
            .await?;

        Ok(ProcessedFile {
            file_name: document.title,
            metadata_id: ingested.metadata_id,
            extension: document.extension,
            fragment_count: ingested.fragment_ids.len(),
        })
    }

    /// Fragments of valid documents most similar to `query`
    pub async fn get_relevant_context(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ContextDocument>> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;
        let documents = self.valid_documents().await?;

        let hits = self
            .fragments
            .vector_search(&embedding.values, top_k, |fragment| {
                documents.contains_key(&fragment.id_metadata_document)
            })
            .await?;
        debug!("Retrieved {} fragments for query", hits.len());

        Ok(to_context(hits, &documents))
    }

    /// Keyword search over fragments of valid documents
    pub async fn search_by_text(&self, query: &str, limit: usize) -> Result<Vec<ContextDocument>> {
        let documents = self.valid_documents().await?;
        let hits: Vec<ScoredFragment> = self
            .fragments
            .search_by_text(query, usize::MAX)
            .await?
            .into_iter()
            .filter(|hit| documents.contains_key(&hit.fragment.id_metadata_document))
            .take(limit)
            .collect();

        Ok(to_context(hits, &documents))
    }

    /// Answer a question from the retrieved context
    pub async fn query<G: Generator>(
        &self,
        question: &str,
        top_k: usize,
        generator: &G,
    ) -> Result<RagAnswer> {
        let sources = self.get_relevant_context(question, top_k).await?;
        let prompt = medical_prompt(&join_context(&sources), question);
        let answer = generator.generate(&prompt).await?;

        Ok(RagAnswer {
            answer,
            confidence: retrieval_confidence(&sources),
            sources,
        })
    }

    pub async fn list_documents(&self) -> Result<Vec<MetadataDocument>> {
        self.metadata.find_all().await
    }

    /// Valid documents of one type, newest first
    pub async fn list_documents_by_type(&self, document_type: &str) -> Result<Vec<MetadataDocument>> {
        self.metadata.find_by_document_type(document_type).await
    }

    pub async fn document_fragments(&self, metadata_id: &str) -> Result<Vec<FragmentDocument>> {
        self.fragments.find_by_metadata_document_id(metadata_id).await
    }

    /// Hide a document from retrieval without deleting it
    pub async fn invalidate_document(&self, metadata_id: &str) -> Result<bool> {
        self.metadata.mark_as_invalid(metadata_id).await
    }

    /// Remove a document with its fragments and index points
    pub async fn delete_document(&self, metadata_id: &str) -> Result<bool> {
        let fragments_deleted = self
            .fragments
            .delete_by_metadata_document_id(metadata_id)
            .await?;
        let metadata_deleted = self.metadata.delete(metadata_id).await?;
        Ok(fragments_deleted || metadata_deleted)
    }

    /// Recreate the native vector index from the stored fragments
    pub async fn rebuild_index(&self) -> Result<usize> {
        self.fragments.rebuild_index().await
    }

    pub async fn stats(&self) -> Result<KnowledgeBaseStats> {
        Ok(KnowledgeBaseStats {
            documents: self.metadata.document_stats().await?,
            fragments: self.fragments.fragment_stats().await?,
        })
    }

    /// Load the built-in sample guides
    pub async fn seed_knowledge_base(&self) -> Result<IngestReport> {
        info!("Seeding knowledge base with sample medical guides");
        self.add_documents(sample_documents()).await
    }

    async fn valid_documents(&self) -> Result<HashMap<String, MetadataDocument>> {
        Ok(self
            .metadata
            .find_all()
            .await?
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect())
    }
}

/// Mean source score clamped to `[0, 1]`, zero without sources
pub fn retrieval_confidence(sources: &[ContextDocument]) -> f32 {
    if sources.is_empty() {
        return 0.0;
    }
    let mean = sources.iter().map(|s| s.score).sum::<f32>() / sources.len() as f32;
    if mean.is_nan() {
        0.0
    } else {
        mean.clamp(0.0, 1.0)
    }
}

/// Fragment contents separated by blank lines
pub fn join_context(sources: &[ContextDocument]) -> String {
    sources
        .iter()
        .map(|source| source.content.as_str())
        .collect::<Vec<&str>>()
        .join("\n\n")
}

fn to_context(
    hits: Vec<ScoredFragment>,
    documents: &HashMap<String, MetadataDocument>,
) -> Vec<ContextDocument> {
    hits.into_iter()
        .map(|hit| {
            let document_title = documents
                .get(&hit.fragment.id_metadata_document)
                .map(|doc| doc.document_title.clone())
                .unwrap_or_else(|| DEFAULT_TITLE.to_string());
            ContextDocument {
                content: hit.fragment.content,
                fragment_id: hit.fragment.id,
                metadata_document_id: hit.fragment.id_metadata_document,
                chunk_index: hit.fragment.chunk_index,
                document_title,
                score: hit.score,
            }
        })
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Store;
    use crate::testing::{CannedGenerator, FailingEmbedder, KeywordEmbedder};
    use std::fs;
    use tempfile::TempDir;

    fn service<E: Embedder>(embedder: E) -> RagService<E> {
        let store = Store::in_memory();
        RagService::new(
            MetadataDocumentRepository::new(store.clone()),
            FragmentDocumentRepository::new(store, None),
            embedder,
            ChunkingConfig::default(),
        )
    }

    async fn seeded() -> RagService<KeywordEmbedder> {
        let rag = service(KeywordEmbedder::medical());
        rag.seed_knowledge_base().await.unwrap();
        rag
    }

    #[tokio::test]
    async fn test_seed_and_retrieve() {
        let rag = seeded().await;

        let results = rag
            .get_relevant_context("I have a migraine headache and nausea", 2)
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        assert_eq!(results[0].document_title, "Clinical Guide: Migraine");
        assert!(results[0].score > 0.0);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_add_document_applies_defaults() {
        let rag = service(KeywordEmbedder::medical());
        let ingested = rag
            .add_document(SourceDocument::new("Fever and cough are common."))
            .await
            .unwrap();

        assert_eq!(ingested.title, DEFAULT_TITLE);
        assert_eq!(ingested.fragment_ids.len(), 1);

        let docs = rag.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document_type, DEFAULT_DOCUMENT_TYPE);
        assert_eq!(docs[0].metadata["fragment_count"], Value::from(1));
    }

    #[tokio::test]
    async fn test_seed_reports_documents_and_fragments() {
        let rag = service(KeywordEmbedder::medical());
        let report = rag.seed_knowledge_base().await.unwrap();

        assert_eq!(report.documents.len(), 3);
        let stats = rag.stats().await.unwrap();
        assert_eq!(report.total_fragments, stats.fragments.total_fragments);
        assert_eq!(stats.documents.valid_total, 3);
    }

    #[tokio::test]
    async fn test_list_documents_by_type() {
        let rag = seeded().await;
        let extra = rag
            .add_document(SourceDocument {
                text: "Tension headache is usually bilateral.".to_string(),
                title: Some("Tension Headache".to_string()),
                document_type: Some("neurology".to_string()),
                metadata: Map::new(),
            })
            .await
            .unwrap();

        let neurology = rag.list_documents_by_type("neurology").await.unwrap();
        let titles: Vec<&str> = neurology.iter().map(|d| d.document_title.as_str()).collect();
        assert_eq!(titles, vec!["Tension Headache", "Clinical Guide: Migraine"]);

        rag.invalidate_document(&extra.metadata_id).await.unwrap();
        assert_eq!(rag.list_documents_by_type("neurology").await.unwrap().len(), 1);
        assert!(rag.list_documents_by_type("cardiology").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_store_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        fs::create_dir(dir.path().join("knowledge_base.json.tmp")).unwrap();
        let rag = RagService::new(
            MetadataDocumentRepository::new(store.clone()),
            FragmentDocumentRepository::new(store, None),
            KeywordEmbedder::medical(),
            ChunkingConfig::default(),
        );

        assert!(rag
            .add_document(SourceDocument::new("Fever and cough."))
            .await
            .is_err());

        let stats = rag.stats().await.unwrap();
        assert_eq!(stats.documents.total, 0);
        assert_eq!(stats.fragments.total_fragments, 0);
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected() {
        let rag = service(KeywordEmbedder::medical());
        assert!(rag.add_document(SourceDocument::new("  \n ")).await.is_err());
        assert!(rag.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_nothing_behind() {
        let rag = service(FailingEmbedder);
        assert!(rag.seed_knowledge_base().await.is_err());

        let stats = rag.stats().await.unwrap();
        assert_eq!(stats.documents.total, 0);
        assert_eq!(stats.fragments.total_fragments, 0);
    }

    #[tokio::test]
    async fn test_invalid_documents_are_not_retrieved() {
        let rag = seeded().await;
        let migraine = rag
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .find(|d| d.document_title.contains("Migraine"))
            .unwrap();

        assert!(rag.invalidate_document(&migraine.id).await.unwrap());

        let results = rag
            .get_relevant_context("migraine headache", 5)
            .await
            .unwrap();
        assert!(results
            .iter()
            .all(|r| r.metadata_document_id != migraine.id));
        let text_results = rag.search_by_text("migraine", 5).await.unwrap();
        assert!(text_results
            .iter()
            .all(|r| r.metadata_document_id != migraine.id));
    }

    #[tokio::test]
    async fn test_delete_document() {
        let rag = seeded().await;
        let doc = rag.list_documents().await.unwrap().remove(0);

        assert!(rag.delete_document(&doc.id).await.unwrap());
        assert!(rag.document_fragments(&doc.id).await.unwrap().is_empty());
        assert_eq!(rag.stats().await.unwrap().documents.total, 2);
        assert!(!rag.delete_document(&doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_by_text() {
        let rag = seeded().await;
        let results = rag.search_by_text("glucose monitoring", 3).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].document_title, "Manual: Type 2 Diabetes Mellitus");
    }

    #[tokio::test]
    async fn test_query_builds_prompt_from_sources() {
        let rag = seeded().await;
        let generator = CannedGenerator::new("Drink water and rest.");

        let answer = rag
            .query("What helps with pneumonia cough and fever?", 3, &generator)
            .await
            .unwrap();

        assert_eq!(answer.answer, "Drink water and rest.");
        assert!(!answer.sources.is_empty());
        assert!(answer.confidence > 0.0 && answer.confidence <= 1.0);

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Pneumonia"));
        assert!(prompts[0].contains("User question: What helps with pneumonia cough and fever?"));
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing() {
        let rag = seeded().await;
        assert!(rag.get_relevant_context("   ", 5).await.unwrap().is_empty());
        assert!(rag.get_relevant_context("fever", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_process_files_collects_errors() {
        let dir = TempDir::new().unwrap();
        let notes = dir.path().join("asthma.txt");
        fs::write(&notes, "Asthma causes cough and wheezing.\n\nUse an inhaler.").unwrap();
        let binary = dir.path().join("scan.bin");
        fs::write(&binary, [0u8, 1, 2, 3]).unwrap();
        let missing = dir.path().join("missing.txt");

        let rag = service(KeywordEmbedder::medical());
        let report = rag
            .process_files(
                &[notes, binary, missing],
                "pulmonology",
                Some("respiratory"),
                None,
            )
            .await;

        assert_eq!(report.processed_documents.len(), 1);
        assert_eq!(report.processed_documents[0].file_name, "asthma.txt");
        assert_eq!(report.processed_documents[0].extension, ".txt");
        assert_eq!(report.total_fragments, 1);
        assert_eq!(report.errors.len(), 2);

        let docs = rag.list_documents().await.unwrap();
        assert_eq!(docs[0].document_type, "pulmonology");
        assert_eq!(docs[0].metadata["specialty"], Value::from("respiratory"));
    }

    #[test]
    fn test_retrieval_confidence() {
        let source = |score: f32| ContextDocument {
            content: String::new(),
            fragment_id: String::new(),
            metadata_document_id: String::new(),
            chunk_index: 0,
            document_title: String::new(),
            score,
        };

        assert_eq!(retrieval_confidence(&[]), 0.0);
        assert!((retrieval_confidence(&[source(0.5), source(0.7)]) - 0.6).abs() < 1e-6);
        assert_eq!(retrieval_confidence(&[source(-0.4)]), 0.0);
    }
}
