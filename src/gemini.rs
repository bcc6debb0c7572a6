use crate::config::{self, Lookup};
use crate::embeddings::{Embedding, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash";
/// Output size of text-embedding-004
const DEFAULT_DIMENSION: usize = 768;
/// batchEmbedContents accepts at most this many requests per call
const MAX_BATCH_SIZE: usize = 100;
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Configuration for Gemini API
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub dimension: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub max_output_tokens: i32,
}

impl GeminiConfig {
    /// Configuration with default models and sampling parameters
    pub fn new(api_key: impl Into<String>) -> Self {
        GeminiConfig {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            temperature: 0.2,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }

    pub fn from_lookup(lookup: Lookup) -> Result<Self> {
        let defaults = GeminiConfig::new(config::required(lookup, "GEMINI_API_KEY")?);

        Ok(GeminiConfig {
            base_url: config::string_or(lookup, "GEMINI_BASE_URL", &defaults.base_url),
            embedding_model: config::string_or(
                lookup,
                "GEMINI_EMBEDDING_MODEL",
                &defaults.embedding_model,
            ),
            generation_model: config::string_or(
                lookup,
                "GEMINI_GENERATION_MODEL",
                &defaults.generation_model,
            ),
            dimension: config::parse_or(lookup, "EMBEDDING_DIMENSION", defaults.dimension)?,
            ..defaults
        })
    }
}

/// Client for interacting with Gemini API
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::new();
        GeminiClient { config, client }
    }

    /// Get the client configuration
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method
        )
    }

    fn model_name(model: &str) -> String {
        format!("models/{}", model)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> std::result::Result<R, String> {
        // The key goes in a header so it never shows up in error messages
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("API request failed: {} {}", status, error_text));
        }

        response
            .json()
            .await
            .map_err(|e| e.without_url().to_string())
    }

    fn embed_request<'a>(&self, text: &'a str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: Self::model_name(&self.config.embedding_model),
            content: Content::new(None, text),
            // Only ask for truncated vectors when the configured size differs
            output_dimensionality: (self.config.dimension != DEFAULT_DIMENSION)
                .then_some(self.config.dimension),
        }
    }
}

impl EmbeddingProvider for GeminiClient {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Generate embeddings for a text
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let url = self.model_url(&self.config.embedding_model, "embedContent");

        let response: EmbedContentResponse = self
            .post(&url, &self.embed_request(text))
            .await
            .map_err(RagError::Embedding)?;

        Ok(Embedding::new(response.embedding.values))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let url = self.model_url(&self.config.embedding_model, "batchEmbedContents");
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH_SIZE) {
            debug!("Embedding batch of {} texts", batch.len());

            let request = BatchEmbedRequest {
                requests: batch.iter().map(|t| self.embed_request(t)).collect(),
            };

            let response: BatchEmbedResponse = self
                .post(&url, &request)
                .await
                .map_err(RagError::Embedding)?;

            if response.embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }

            embeddings.extend(
                response
                    .embeddings
                    .into_iter()
                    .map(|e| Embedding::new(e.values)),
            );
        }

        Ok(embeddings)
    }
}

impl GenerationProvider for GeminiClient {
    /// Generate text using the configured Gemini model
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            system_instruction: Content::new(None, system_prompt),
            contents: vec![Content::new(Some("user"), user_prompt)],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let url = self.model_url(&self.config.generation_model, "generateContent");

        let response: GenerateResponse = self
            .post(&url, &request)
            .await
            .map_err(RagError::Generation)?;

        response
            .into_text()
            .ok_or_else(|| RagError::Generation("No response generated".to_string()))
    }
}

// Request/response structures for the Gemini API

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize, Debug)]
struct EmbedContentResponse {
    embedding: EmbeddingData,
}

#[derive(Deserialize, Debug)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn new(role: Option<&'static str>, text: &'a str) -> Self {
        Content {
            role,
            parts: vec![Part { text }],
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate, if it has any text
    fn into_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let text: String = candidate
            .content?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();

        (!text.is_empty()).then_some(text)
    }
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}
