//! Explicit configuration for every collaborator.
//!
//! Nothing in the library reads the process environment on its own: `main`
//! loads `.env`, builds a [`Settings`] through [`Settings::from_env`] and hands
//! each piece to the client that needs it. All readers go through a lookup
//! function so the parsing can be exercised without touching real variables.

use crate::chunking::ChunkingStrategy;
use crate::database::QdrantConfig;
use crate::error::{RagError, Result};
use crate::gemini::GeminiConfig;
use crate::openai::OpenAiConfig;
use crate::rag::RagOptions;
use crate::uploads::UploadConfig;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Source of configuration values, keyed by variable name
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read a variable that has no sensible default
pub(crate) fn required(lookup: Lookup, key: &str) -> Result<String> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RagError::Config(format!("{} is not set", key)))
}

/// Read and parse an optional variable
pub(crate) fn parse_opt<T>(lookup: Lookup, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RagError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

/// Read and parse a variable, falling back to `default` when unset
pub(crate) fn parse_or<T>(lookup: Lookup, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

/// Read a string variable, falling back to `default` when unset
pub(crate) fn string_or(lookup: Lookup, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Which hosted service provides embeddings and completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    Gemini,
    #[value(name = "openai")]
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(format!("unknown provider '{}', expected gemini or openai", other)),
        }
    }
}

/// Model provider configuration, one variant per supported service
#[derive(Clone)]
pub enum ProviderConfig {
    Gemini(GeminiConfig),
    OpenAi(OpenAiConfig),
}

impl ProviderConfig {
    pub fn from_lookup(kind: ProviderKind, lookup: Lookup) -> Result<Self> {
        Ok(match kind {
            ProviderKind::Gemini => ProviderConfig::Gemini(GeminiConfig::from_lookup(lookup)?),
            ProviderKind::OpenAi => ProviderConfig::OpenAi(OpenAiConfig::from_lookup(lookup)?),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderConfig::Gemini(_) => ProviderKind::Gemini,
            ProviderConfig::OpenAi(_) => ProviderKind::OpenAi,
        }
    }
}

/// Everything the binary needs to wire up the pipeline
#[derive(Clone)]
pub struct Settings {
    pub qdrant: QdrantConfig,
    pub provider: ProviderConfig,
    pub rag: RagOptions,
    pub uploads: UploadConfig,
}

impl Settings {
    /// Build settings from the process environment
    pub fn from_env(provider: Option<ProviderKind>) -> Result<Self> {
        Self::from_lookup(provider, &|key: &str| env::var(key).ok())
    }

    /// Build settings from an arbitrary lookup. `provider` overrides `RAG_PROVIDER`.
    pub fn from_lookup(provider: Option<ProviderKind>, lookup: Lookup) -> Result<Self> {
        let kind = match provider {
            Some(kind) => kind,
            None => parse_or(lookup, "RAG_PROVIDER", ProviderKind::Gemini)?,
        };

        Ok(Settings {
            qdrant: QdrantConfig::from_lookup(lookup)?,
            provider: ProviderConfig::from_lookup(kind, lookup)?,
            rag: rag_options_from_lookup(lookup)?,
            uploads: UploadConfig::from_lookup(lookup)?,
        })
    }
}

fn rag_options_from_lookup(lookup: Lookup) -> Result<RagOptions> {
    let defaults = RagOptions::default();

    let top_k = parse_or(lookup, "RAG_TOP_K", defaults.top_k)?;
    if top_k == 0 {
        return Err(RagError::Config("RAG_TOP_K must be at least 1".to_string()));
    }

    let chunking = match parse_opt::<usize>(lookup, "RAG_CHUNK_TOKENS")? {
        Some(target_tokens) if target_tokens > 0 => ChunkingStrategy::Bounded {
            target_tokens,
            overlap_tokens: parse_or(lookup, "RAG_CHUNK_OVERLAP", 0)?,
        },
        _ => ChunkingStrategy::Paragraph,
    };

    let answer_language = lookup("RAG_ANSWER_LANGUAGE").filter(|v| !v.trim().is_empty());

    Ok(RagOptions {
        top_k,
        chunking,
        answer_language,
    })
}
