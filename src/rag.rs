use crate::chunking::{Chunk, ChunkingStrategy, SOURCE_KEY};
use crate::database::VectorIndex;
use crate::document::Document;
use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::prompt;
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

/// Tunables of the ingest and answer pipelines
#[derive(Debug, Clone, PartialEq)]
pub struct RagOptions {
    /// Number of chunks retrieved per question
    pub top_k: usize,
    pub chunking: ChunkingStrategy,
    /// Language the model is asked to answer in, if any
    pub answer_language: Option<String>,
}

impl Default for RagOptions {
    fn default() -> Self {
        RagOptions {
            top_k: 5,
            chunking: ChunkingStrategy::Paragraph,
            answer_language: None,
        }
    }
}

/// RAG (Retrieval-Augmented Generation) engine
pub struct RagEngine<E, I, G> {
    embedder: E,
    index: I,
    generator: G,
    options: RagOptions,
}

impl<E, I, G> RagEngine<E, I, G>
where
    E: EmbeddingProvider,
    I: VectorIndex,
    G: GenerationProvider,
{
    /// Create a new RAG engine
    pub fn new(embedder: E, index: I, generator: G, options: RagOptions) -> Self {
        RagEngine {
            embedder,
            index,
            generator,
            options,
        }
    }

    pub fn options(&self) -> &RagOptions {
        &self.options
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Extract, embed and index a document, returning the number of chunks stored.
    ///
    /// Every chunk carries a copy of `metadata` plus a `source` entry (the
    /// caller's, or the file name). Nothing is written to the index unless
    /// extraction and embedding both succeed.
    pub async fn ingest(&self, path: &Path, metadata: HashMap<String, String>) -> Result<usize> {
        let document = Document::from_file(path)?;
        let texts = self.options.chunking.apply(document.paragraphs());
        info!("Split {} into {} chunks", document.file_name, texts.len());

        if texts.is_empty() {
            return Ok(0);
        }

        let mut metadata = metadata;
        metadata
            .entry(SOURCE_KEY.to_string())
            .or_insert_with(|| document.file_name.clone());

        info!("Generating embeddings for {} chunks...", texts.len());
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let chunks: Vec<Chunk> = texts
            .into_iter()
            .map(|text| Chunk::new(text, metadata.clone()))
            .collect();
        let count = chunks.len();

        self.index.insert(chunks, embeddings).await?;
        info!("Indexed {} chunks from {}", count, document.file_name);

        Ok(count)
    }

    /// Answer a question from the `top_k` most similar chunks
    pub async fn answer(&self, question: &str) -> Result<String> {
        self.answer_with_k(question, self.options.top_k).await
    }

    /// Answer a question from the `k` most similar chunks, citing their sources
    pub async fn answer_with_k(&self, question: &str, k: usize) -> Result<String> {
        // Get embedding for the question
        let question_embedding = self.embedder.embed(question).await?;

        // Retrieve relevant chunks
        let chunks = self.index.query(&question_embedding, k).await?;
        debug!("Retrieved {} chunks for question", chunks.len());

        let context = prompt::build_context(&chunks);
        let sources = prompt::unique_sources(&chunks);
        let user_prompt = prompt::build_user_prompt(
            &context,
            question,
            self.options.answer_language.as_deref(),
        );

        // Generate answer
        let answer = self
            .generator
            .complete(prompt::SYSTEM_PROMPT, &user_prompt)
            .await?;

        Ok(prompt::append_sources(answer, &sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        FailingEmbedder, FailingIndex, VocabEmbedder, MemoryIndex, RecordingGenerator,
    };
    use std::fs;

    fn engine() -> RagEngine<VocabEmbedder, MemoryIndex, RecordingGenerator> {
        RagEngine::new(
            VocabEmbedder,
            MemoryIndex::new(VocabEmbedder::DIMENSION),
            RecordingGenerator::replying("Generated response"),
            RagOptions::default(),
        )
    }

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_ingest_two_chunk_txt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "notes.txt", "Rust has ownership.\n\nRust has borrowing.");
        let engine = engine();

        let count = engine.ingest(&path, HashMap::new()).await.unwrap();

        assert_eq!(count, 2);
        let entries = engine.index().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Rust has ownership.");
        assert_eq!(entries[1].text, "Rust has borrowing.");
        assert!(entries.iter().all(|e| e.metadata["source"] == "notes.txt"));
    }

    #[tokio::test]
    async fn test_ingest_count_matches_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let paragraphs: Vec<String> = (0..7).map(|i| format!("paragraph number {}", i)).collect();
        let path = write(&dir, "many.txt", &paragraphs.join("\n\n\n"));
        let engine = engine();

        let count = engine.ingest(&path, HashMap::new()).await.unwrap();

        assert_eq!(count, 7);
        assert_eq!(engine.index().entries().len(), 7);
    }

    #[tokio::test]
    async fn test_ingest_keeps_caller_metadata_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "0b1c_report.txt", "Only paragraph");
        let engine = engine();
        let metadata = HashMap::from([
            ("source".to_string(), "report.txt".to_string()),
            ("original_name".to_string(), "report.txt".to_string()),
        ]);

        engine.ingest(&path, metadata).await.unwrap();

        let entries = engine.index().entries();
        assert_eq!(entries[0].metadata["source"], "report.txt");
        assert_eq!(entries[0].metadata["original_name"], "report.txt");
    }

    #[tokio::test]
    async fn test_ingest_unsupported_format_indexes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "slides.pptx", "Intro\n\nBody");
        let engine = engine();

        let err = engine.ingest(&path, HashMap::new()).await.unwrap_err();

        assert!(matches!(err, RagError::UnsupportedFormat(_)));
        assert!(engine.index().entries().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_corrupt_pdf_indexes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "broken.pdf", "not a pdf at all");
        let engine = engine();

        let err = engine.ingest(&path, HashMap::new()).await.unwrap_err();

        assert!(matches!(err, RagError::Extraction { .. }));
        assert!(engine.index().entries().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_empty_document_skips_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "blank.txt", "\n\n   \n\n");
        let engine = RagEngine::new(
            VocabEmbedder,
            FailingIndex,
            RecordingGenerator::replying("unused"),
            RagOptions::default(),
        );

        assert_eq!(engine.ingest(&path, HashMap::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingest_embedding_failure_indexes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "notes.txt", "a\n\nb");
        let engine = RagEngine::new(
            FailingEmbedder,
            MemoryIndex::new(VocabEmbedder::DIMENSION),
            RecordingGenerator::replying("unused"),
            RagOptions::default(),
        );

        let err = engine.ingest(&path, HashMap::new()).await.unwrap_err();

        assert!(matches!(err, RagError::Embedding(_)));
        assert!(engine.index().entries().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_index_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "notes.txt", "a\n\nb");
        let engine = RagEngine::new(
            VocabEmbedder,
            FailingIndex,
            RecordingGenerator::replying("unused"),
            RagOptions::default(),
        );

        let err = engine.ingest(&path, HashMap::new()).await.unwrap_err();

        assert!(matches!(err, RagError::Index(_)));
    }

    #[tokio::test]
    async fn test_ingest_with_bounded_chunking() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "notes.txt", "one two\n\nthree four\n\nfive six");
        let engine = RagEngine::new(
            VocabEmbedder,
            MemoryIndex::new(VocabEmbedder::DIMENSION),
            RecordingGenerator::replying("unused"),
            RagOptions {
                chunking: ChunkingStrategy::Bounded {
                    target_tokens: 4,
                    overlap_tokens: 0,
                },
                ..RagOptions::default()
            },
        );

        let count = engine.ingest(&path, HashMap::new()).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(engine.index().entries()[0].text, "one two\n\nthree four");
    }

    #[tokio::test]
    async fn test_answer_lists_single_unique_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "notes.txt", "Rust has ownership.\n\nRust has borrowing.");
        let engine = engine();
        engine.ingest(&path, HashMap::new()).await.unwrap();

        let response = engine.answer("What does Rust have?").await.unwrap();

        assert_eq!(response, "Generated response\n\nSources: notes.txt");
        assert_eq!(response.matches("notes.txt").count(), 1);
    }

    #[tokio::test]
    async fn test_answer_prompt_uses_retrieval_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "zoo.txt",
            "penguins live in antarctica\n\nlions live in savanna grassland",
        );
        let engine = engine();
        engine.ingest(&path, HashMap::new()).await.unwrap();

        engine.answer("where do lions live").await.unwrap();

        let (system, user) = engine.generator.last_prompt().unwrap();
        assert_eq!(system, prompt::SYSTEM_PROMPT);
        assert!(user.contains(
            "Context:\nlions live in savanna grassland\n\npenguins live in antarctica\n\n"
        ));
        assert!(user.ends_with("Question: where do lions live"));
    }

    #[tokio::test]
    async fn test_answer_sources_come_from_retrieved_chunks_only() {
        let dir = tempfile::tempdir().unwrap();
        let cats = write(&dir, "cats.txt", "cats purr and meow");
        let dogs = write(&dir, "dogs.txt", "dogs bark loudly");
        let engine = engine();
        engine.ingest(&cats, HashMap::new()).await.unwrap();
        engine.ingest(&dogs, HashMap::new()).await.unwrap();

        let response = engine.answer_with_k("cats purr", 1).await.unwrap();

        assert!(response.ends_with("Sources: cats.txt"));
        assert!(!response.contains("dogs.txt"));
    }

    #[tokio::test]
    async fn test_answer_on_empty_index_has_no_sources() {
        let engine = engine();

        let response = engine.answer("anything?").await.unwrap();

        assert_eq!(response, "Generated response");
        let (_, user) = engine.generator.last_prompt().unwrap();
        assert!(user.contains("Context:\n\n\nQuestion: anything?"));
    }

    #[tokio::test]
    async fn test_answer_asks_for_configured_language() {
        let engine = RagEngine::new(
            VocabEmbedder,
            MemoryIndex::new(VocabEmbedder::DIMENSION),
            RecordingGenerator::replying("Oui"),
            RagOptions {
                answer_language: Some("French".to_string()),
                ..RagOptions::default()
            },
        );

        engine.answer("Quoi?").await.unwrap();

        let (_, user) = engine.generator.last_prompt().unwrap();
        assert!(user.ends_with("Answer in French."));
    }

    #[tokio::test]
    async fn test_answer_generation_failure_propagates() {
        let engine = RagEngine::new(
            VocabEmbedder,
            MemoryIndex::new(VocabEmbedder::DIMENSION),
            RecordingGenerator::failing(),
            RagOptions::default(),
        );

        let err = engine.answer("question").await.unwrap_err();

        assert!(matches!(err, RagError::Generation(_)));
    }

    #[tokio::test]
    async fn test_query_is_repeatable_on_unchanged_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "mixed.txt", "alpha beta\n\ngamma delta\n\nbeta gamma");
        let engine = engine();
        engine.ingest(&path, HashMap::new()).await.unwrap();

        let first = VocabEmbedder.embed("beta").await.unwrap();
        let second = VocabEmbedder.embed("beta").await.unwrap();
        assert_eq!(first, second);

        let a = engine.index().query(&first, 3).await.unwrap();
        let b = engine.index().query(&second, 3).await.unwrap();
        assert_eq!(a, b);
    }
}
