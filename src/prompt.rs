//! Prompt assembly for grounded answers.

use crate::database::ScoredChunk;

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions based on the provided documents.";

/// What the model is told to say when the context does not cover the question
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information to answer this question.";

/// Chunk texts joined by blank lines, in retrieval order
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|scored| scored.chunk.text.as_str())
        .collect::<Vec<&str>>()
        .join("\n\n")
}

/// The user turn: instructions, retrieved context and the question
pub fn build_user_prompt(context: &str, question: &str, answer_language: Option<&str>) -> String {
    let mut prompt = format!(
        "Answer the following question based on the provided context.\n\
         If you cannot answer based on the context, say \"{}\"\n\n\
         Context:\n{}\n\n\
         Question: {}",
        INSUFFICIENT_INFORMATION, context, question
    );

    if let Some(language) = answer_language {
        prompt.push_str(&format!("\n\nAnswer in {}.", language));
    }

    prompt
}

/// Source names of the retrieved chunks, deduplicated in first-seen order
pub fn unique_sources(chunks: &[ScoredChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();

    for source in chunks.iter().filter_map(|scored| scored.chunk.source()) {
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }

    sources
}

/// Append a "Sources:" line to the answer when there is anything to cite
pub fn append_sources(mut answer: String, sources: &[String]) -> String {
    if !sources.is_empty() {
        answer.push_str("\n\nSources: ");
        answer.push_str(&sources.join(", "));
    }
    answer
}
