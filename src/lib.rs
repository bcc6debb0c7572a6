pub mod chat;
pub mod chunking;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod gemini;
pub mod generation;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod rag;
pub mod session;
pub mod uploads;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{RagError, Result};
