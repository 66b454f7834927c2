use crate::embeddings::Embedder;
use crate::entity::ChatHistory;
use crate::generation::{fallback_response, medical_prompt, Generator};
use crate::rag::{join_context, retrieval_confidence, ContextDocument, RagService};
use crate::repository::{ChatHistoryRepository, ConversationSummary, Repository};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::io::{self, Write};
use uuid::Uuid;

/// Confidence reported when the canned fallback reply is used
pub const FALLBACK_CONFIDENCE: f32 = 0.7;

/// The assistant's answer to one user message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub conversation_id: String,
    pub response: String,
    pub confidence: f32,
    pub sources: Vec<ContextDocument>,
    pub chat_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Conversational front end over the RAG service
pub struct ChatService<E, G> {
    rag: RagService<E>,
    history: ChatHistoryRepository,
    generator: G,
    top_k: usize,
}

impl<E: Embedder, G: Generator> ChatService<E, G> {
    pub fn new(
        rag: RagService<E>,
        history: ChatHistoryRepository,
        generator: G,
        top_k: usize,
    ) -> Self {
        ChatService {
            rag,
            history,
            generator,
            top_k,
        }
    }

    pub fn rag(&self) -> &RagService<E> {
        &self.rag
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Answer a message and record the exchange
    pub async fn send_text_message(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(anyhow!("Message must not be empty"));
        }

        let conversation_id = conversation_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(new_conversation_id);

        let sources = match self.rag.get_relevant_context(message, self.top_k).await {
            Ok(sources) => sources,
            Err(e) => {
                warn!("Retrieval failed, answering without context: {:#}", e);
                Vec::new()
            }
        };

        let prompt = medical_prompt(&join_context(&sources), message);
        let (response, confidence) = match self.generator.generate(&prompt).await {
            Ok(text) => (text, retrieval_confidence(&sources)),
            Err(e) => {
                warn!("Generation failed, using fallback reply: {:#}", e);
                (fallback_response(message), FALLBACK_CONFIDENCE)
            }
        };

        let entry = ChatHistory::new(&conversation_id, message, &response);
        let timestamp = entry.date;
        let chat_id = self.history.save(entry).await?;

        Ok(ChatReply {
            conversation_id,
            response,
            confidence,
            sources,
            chat_id,
            timestamp,
        })
    }

    pub async fn get_conversation_history(&self, conversation_id: &str) -> Result<Vec<ChatHistory>> {
        self.history.find_by_conversation_id(conversation_id).await
    }

    /// Most recently active conversations
    pub async fn get_user_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        self.history.recent_conversations(limit).await
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        self.history.delete_conversation(conversation_id).await
    }

    /// Run the interactive chat loop on stdin
    pub async fn run_chat_loop(&self, conversation_id: Option<String>) -> Result<()> {
        let mut conversation_id = conversation_id;
        info!("Medical assistant ready. Type 'exit' to quit.");

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut buffer = String::new();

        loop {
            print!("\nYou: ");
            stdout.flush()?;

            buffer.clear();
            if stdin.read_line(&mut buffer)? == 0 {
                break;
            }

            let message = buffer.trim();
            if message.eq_ignore_ascii_case("exit") {
                info!("Goodbye!");
                break;
            }
            if message.is_empty() {
                continue;
            }

            let reply = self
                .send_text_message(message, conversation_id.as_deref())
                .await?;
            conversation_id = Some(reply.conversation_id.clone());

            println!("\nAssistant: {}", reply.response);
            for source in &reply.sources {
                println!(
                    "  - {} (fragment {}, score {:.3})",
                    source.document_title, source.chunk_index, source.score
                );
            }
            println!(
                "[conversation {} | confidence {:.2}]",
                reply.conversation_id, reply.confidence
            );
        }

        Ok(())
    }
}

/// `conv_` followed by 12 hex characters
pub fn new_conversation_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("conv_{}", &hex[..12])
}
