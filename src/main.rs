use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info, warn};
use std::path::PathBuf;

use medico_rag::chat::ChatService;
use medico_rag::config::AppConfig;
use medico_rag::database::QdrantIndex;
use medico_rag::embeddings::EmbeddingProvider;
use medico_rag::ollama::OllamaClient;
use medico_rag::rag::{ContextDocument, RagService, DEFAULT_DOCUMENT_TYPE};
use medico_rag::repository::{
    ChatHistoryRepository, FragmentDocumentRepository, MetadataDocumentRepository, Store,
};

/// A medical assistant answering from a local knowledge base with retrieval-augmented generation
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add text or PDF files to the knowledge base
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long = "type", default_value = DEFAULT_DOCUMENT_TYPE)]
        document_type: String,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Load the built-in sample medical guides
    Seed,
    /// Show the fragments most relevant to a query
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Rank by keyword overlap instead of embeddings
        #[arg(long)]
        text: bool,
    },
    /// Answer a single question
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Start an interactive conversation
    Chat {
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Print the exchanges of a conversation
    History { conversation_id: String },
    /// List recently active conversations
    Conversations {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    DeleteConversation { conversation_id: String },
    /// List valid documents, newest first
    Documents {
        /// Only documents of this type
        #[arg(long = "type")]
        document_type: Option<String>,
    },
    /// Exclude a document from retrieval
    Invalidate { id: String },
    DeleteDocument { id: String },
    Stats,
    /// Recreate the vector index from the stored fragments
    Reindex,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Load configuration from environment
    let config = AppConfig::from_env().context("Invalid configuration")?;
    let chat = build_chat_service(&config).await?;

    run(args.command, &chat, &config).await
}

async fn build_chat_service(
    config: &AppConfig,
) -> Result<ChatService<EmbeddingProvider, OllamaClient>> {
    let store = Store::open(&config.data_dir)
        .await
        .context("Failed to open knowledge base")?;

    let index = match &config.qdrant {
        Some(qdrant_config) => {
            let index = QdrantIndex::new(qdrant_config.clone())
                .context("Failed to initialize Qdrant client")?;
            info!("Using Qdrant collection {}", index.collection());
            Some(index)
        }
        None => {
            info!("QDRANT_URL not set, using in-process vector search");
            None
        }
    };

    let rag = RagService::new(
        MetadataDocumentRepository::new(store.clone()),
        FragmentDocumentRepository::new(store.clone(), index),
        config.embedding_provider()?,
        config.chunking,
    );
    let generator = OllamaClient::new(config.ollama.clone())?;

    Ok(ChatService::new(
        rag,
        ChatHistoryRepository::new(store),
        generator,
        config.top_k,
    ))
}

async fn run(
    command: Command,
    chat: &ChatService<EmbeddingProvider, OllamaClient>,
    config: &AppConfig,
) -> Result<()> {
    let rag = chat.rag();

    match command {
        Command::Ingest {
            paths,
            document_type,
            specialty,
            description,
        } => {
            let report = rag
                .process_files(
                    &paths,
                    &document_type,
                    specialty.as_deref(),
                    description.as_deref(),
                )
                .await;
            for processed in &report.processed_documents {
                println!(
                    "{} -> {} ({} fragments)",
                    processed.file_name, processed.metadata_id, processed.fragment_count
                );
            }
            for failure in &report.errors {
                error!("{}: {}", failure.file_name, failure.error);
            }
            println!(
                "{} files processed, {} failed, {} fragments stored",
                report.processed_documents.len(),
                report.errors.len(),
                report.total_fragments
            );
        }
        Command::Seed => {
            let report = rag.seed_knowledge_base().await?;
            for doc in &report.documents {
                println!(
                    "{} -> {} ({} fragments)",
                    doc.title,
                    doc.metadata_id,
                    doc.fragment_ids.len()
                );
            }
            println!("{} fragments stored", report.total_fragments);
        }
        Command::Search { query, top_k, text } => {
            let top_k = top_k.unwrap_or(config.top_k);
            let results = if text {
                rag.search_by_text(&query, top_k).await?
            } else {
                rag.get_relevant_context(&query, top_k).await?
            };
            if results.is_empty() {
                info!("No relevant information found in the knowledge base.");
            }
            print_sources(&results);
        }
        Command::Ask { question, top_k } => {
            let top_k = top_k.unwrap_or(config.top_k);
            let answer = rag.query(&question, top_k, chat.generator()).await?;
            println!("{}", answer.answer);
            print_sources(&answer.sources);
            println!("confidence {:.2}", answer.confidence);
        }
        Command::Chat { conversation } => {
            chat.run_chat_loop(conversation)
                .await
                .context("Error in chat loop")?;
        }
        Command::History { conversation_id } => {
            let history = chat.get_conversation_history(&conversation_id).await?;
            if history.is_empty() {
                warn!("No messages found for conversation {}", conversation_id);
            }
            for entry in history {
                println!("[{}] You: {}", entry.date.to_rfc3339(), entry.prompt);
                println!("Assistant: {}\n", entry.response);
            }
        }
        Command::Conversations { limit } => {
            for summary in chat.get_user_conversations(limit).await? {
                println!(
                    "{}  {} messages  last {}  \"{}\"",
                    summary.conversation_id,
                    summary.message_count,
                    summary.last_date.to_rfc3339(),
                    summary.last_message
                );
            }
        }
        Command::DeleteConversation { conversation_id } => {
            report_deleted(
                chat.delete_conversation(&conversation_id).await?,
                "conversation",
                &conversation_id,
            );
        }
        Command::Documents { document_type } => {
            let documents = match document_type {
                Some(document_type) => rag.list_documents_by_type(&document_type).await?,
                None => rag.list_documents().await?,
            };
            println!("{}", serde_json::to_string_pretty(&documents)?);
        }
        Command::Invalidate { id } => {
            report_deleted(rag.invalidate_document(&id).await?, "document", &id);
        }
        Command::DeleteDocument { id } => {
            report_deleted(rag.delete_document(&id).await?, "document", &id);
        }
        Command::Stats => {
            let stats = rag.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Reindex => {
            let indexed = rag.rebuild_index().await?;
            println!("{} fragments indexed", indexed);
        }
    }

    Ok(())
}

fn print_sources(sources: &[ContextDocument]) {
    for (rank, source) in sources.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} #{}\n   {}",
            rank + 1,
            source.score,
            source.document_title,
            source.chunk_index,
            source.content.replace('\n', " ")
        );
    }
}

fn report_deleted(found: bool, kind: &str, id: &str) {
    if found {
        println!("Updated {} {}", kind, id);
    } else {
        warn!("No {} with id {}", kind, id);
    }
}
