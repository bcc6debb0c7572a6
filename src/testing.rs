//! In-process stand-ins for the external collaborators, used by unit tests.

use crate::chunking::Chunk;
use crate::database::{build_entries, IndexedVector, ScoredChunk, VectorIndex};
use crate::embeddings::{Embedding, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use std::sync::Mutex;

const VOCABULARY: &[&str] = &[
    "rust", "ownership", "borrowing", "penguins", "lions", "live", "antarctica", "savanna",
    "cats", "purr", "meow", "dogs", "bark", "alpha", "beta", "gamma", "delta", "paragraph",
    "number", "intro", "body", "line",
];

/// Bag-of-words embedder over a fixed vocabulary; unknown words are ignored
pub struct VocabEmbedder;

impl VocabEmbedder {
    pub const DIMENSION: usize = VOCABULARY.len();
}

impl EmbeddingProvider for VocabEmbedder {
    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut values = vec![0.0; Self::DIMENSION];

        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if let Some(slot) = VOCABULARY.iter().position(|v| *v == word) {
                values[slot] += 1.0;
            }
        }

        Ok(Embedding::new(values))
    }
}

pub struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn dimension(&self) -> usize {
        VocabEmbedder::DIMENSION
    }

    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(RagError::Embedding("quota exceeded".to_string()))
    }
}

/// Brute-force cosine index kept in memory
pub struct MemoryIndex {
    dimension: usize,
    entries: Mutex<Vec<IndexedVector>>,
}

impl MemoryIndex {
    pub fn new(dimension: usize) -> Self {
        MemoryIndex {
            dimension,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<IndexedVector> {
        self.entries.lock().unwrap().clone()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

impl VectorIndex for MemoryIndex {
    async fn insert(&self, chunks: Vec<Chunk>, vectors: Vec<Embedding>) -> Result<Vec<String>> {
        let entries = build_entries(chunks, vectors, self.dimension)?;
        let ids = entries.iter().map(|e| e.id.clone()).collect();
        self.entries.lock().unwrap().extend(entries);
        Ok(ids)
    }

    async fn query(&self, vector: &Embedding, k: usize) -> Result<Vec<ScoredChunk>> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| ScoredChunk {
                id: entry.id.clone(),
                score: cosine(&vector.values, &entry.vector),
                chunk: Chunk::new(entry.text.clone(), entry.metadata.clone()),
            })
            .collect();

        // Stable sort: ties keep insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Index whose every operation fails
pub struct FailingIndex;

impl VectorIndex for FailingIndex {
    async fn insert(&self, _chunks: Vec<Chunk>, _vectors: Vec<Embedding>) -> Result<Vec<String>> {
        Err(RagError::Index("connection refused".to_string()))
    }

    async fn query(&self, _vector: &Embedding, _k: usize) -> Result<Vec<ScoredChunk>> {
        Err(RagError::Index("connection refused".to_string()))
    }
}

/// Generator returning a canned reply (or failing) and remembering its prompts
pub struct RecordingGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl RecordingGenerator {
    pub fn replying(reply: &str) -> Self {
        RecordingGenerator {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        RecordingGenerator {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// The (system, user) prompts of the most recent call
    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl GenerationProvider for RecordingGenerator {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));

        self.reply
            .clone()
            .ok_or_else(|| RagError::Generation("model unavailable".to_string()))
    }
}
