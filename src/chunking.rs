use std::collections::HashMap;

/// Metadata key holding the file name a chunk was extracted from
pub const SOURCE_KEY: &str = "source";

/// A span of extracted text plus the metadata it is indexed with
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// The text content of this chunk
    pub text: String,
    /// Metadata stored next to the text (always carries `source` after ingestion)
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    pub fn new(text: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        Chunk {
            text: text.into(),
            metadata,
        }
    }

    /// The source file name, if the chunk was tagged with one
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// Split text on blank lines, returning trimmed, non-empty paragraphs in order
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// How extracted paragraphs are turned into retrieval chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkingStrategy {
    /// One chunk per paragraph
    #[default]
    Paragraph,
    /// Paragraphs merged up to `target_tokens`, oversized paragraphs split by
    /// sentence, consecutive chunks sharing roughly `overlap_tokens` of text
    Bounded {
        target_tokens: usize,
        overlap_tokens: usize,
    },
}

impl ChunkingStrategy {
    pub fn apply(&self, paragraphs: Vec<String>) -> Vec<String> {
        match *self {
            ChunkingStrategy::Paragraph => paragraphs,
            ChunkingStrategy::Bounded {
                target_tokens,
                overlap_tokens,
            } => bound_chunks(paragraphs, target_tokens.max(1), overlap_tokens),
        }
    }
}

/// Merge paragraphs into chunks of approximately `target_tokens` tokens
fn bound_chunks(paragraphs: Vec<String>, target_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0;
    // false while `current` only holds overlap carried over from the last chunk
    let mut has_new = false;

    for paragraph in paragraphs {
        let paragraph_tokens = estimate_token_count(&paragraph);

        // A single paragraph that is too large gets split into sentences
        if paragraph_tokens > target_tokens {
            if has_new {
                chunks.push(std::mem::take(&mut current));
            }
            current.clear();
            current_tokens = 0;
            has_new = false;
            chunks.extend(split_sentences(&paragraph, target_tokens, overlap_tokens));
            continue;
        }

        if current_tokens + paragraph_tokens > target_tokens && has_new {
            let overlap = tail_overlap(&current, overlap_tokens);
            chunks.push(std::mem::replace(&mut current, overlap));
            current_tokens = estimate_token_count(&current);

            // Drop the overlap when it would push the next chunk past the target
            if current_tokens + paragraph_tokens > target_tokens {
                current.clear();
                current_tokens = 0;
            }
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&paragraph);
        current_tokens += paragraph_tokens;
        has_new = true;
    }

    if has_new {
        chunks.push(current);
    }

    chunks
}

fn split_sentences(paragraph: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_tokens = 0;
    let mut has_new = false;

    let sentences = paragraph
        .split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty());

    for sentence in sentences {
        let sentence_tokens = estimate_token_count(sentence);

        if buffer_tokens + sentence_tokens > target_tokens && has_new {
            let overlap = tail_overlap(&buffer, overlap_tokens);
            chunks.push(std::mem::replace(&mut buffer, overlap));
            buffer_tokens = estimate_token_count(&buffer);

            if buffer_tokens + sentence_tokens > target_tokens {
                buffer.clear();
                buffer_tokens = 0;
            }
        }

        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(sentence);
        buffer_tokens += sentence_tokens;
        has_new = true;
    }

    if has_new {
        chunks.push(buffer);
    }

    chunks
}

/// The trailing part of `text` used to seed the next chunk.
/// Four characters per token is the approximation.
fn tail_overlap(text: &str, overlap_tokens: usize) -> String {
    if overlap_tokens == 0 {
        return String::new();
    }

    let keep_chars = overlap_tokens * 4;
    let total_chars = text.chars().count();
    let start = text
        .char_indices()
        .nth(total_chars.saturating_sub(keep_chars))
        .map(|(i, _)| i)
        .unwrap_or(0);

    text[start..].trim().to_string()
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}
