pub mod chat;
pub mod chunking;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod entity;
pub mod generation;
pub mod ollama;
pub mod openai;
pub mod rag;
pub mod repository;
pub mod seed;
pub mod similarity;

#[cfg(test)]
pub(crate) mod testing;
