//! OpenAI-compatible chat completion and embedding endpoints.
//!
//! Works against api.openai.com as well as any server exposing the same
//! `/chat/completions` and `/embeddings` routes.

use crate::config::{self, Lookup};
use crate::embeddings::{Embedding, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSION: usize = 1536;

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub temperature: Option<f32>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        OpenAiConfig {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            temperature: None,
        }
    }

    pub fn from_lookup(lookup: Lookup) -> Result<Self> {
        let defaults = OpenAiConfig::new(config::required(lookup, "OPENAI_API_KEY")?);

        Ok(OpenAiConfig {
            base_url: config::string_or(lookup, "OPENAI_BASE_URL", &defaults.base_url),
            chat_model: config::string_or(lookup, "OPENAI_CHAT_MODEL", &defaults.chat_model),
            embedding_model: config::string_or(
                lookup,
                "OPENAI_EMBEDDING_MODEL",
                &defaults.embedding_model,
            ),
            dimension: config::parse_or(lookup, "EMBEDDING_DIMENSION", defaults.dimension)?,
            temperature: config::parse_opt(lookup, "OPENAI_TEMPERATURE")?,
            ..defaults
        })
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        OpenAiClient {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn embedding_request<'a>(&'a self, texts: &'a [String]) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
            dimensions: (self.config.dimension != DEFAULT_DIMENSION)
                .then_some(self.config.dimension),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), route)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        route: &str,
        body: &B,
    ) -> std::result::Result<R, String> {
        let response = self
            .client
            .post(self.url(route))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("API request failed: Status {}, Body: {}", status, error_text));
        }

        response.json().await.map_err(|e| e.to_string())
    }
}

impl EmbeddingProvider for OpenAiClient {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts with {}", texts.len(), self.config.embedding_model);

        let response: EmbeddingResponse = self
            .post("embeddings", &self.embedding_request(texts))
            .await
            .map_err(RagError::Embedding)?;

        response.into_ordered(texts.len()).map_err(RagError::Embedding)
    }
}

impl GenerationProvider for OpenAiClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let response: ChatResponse = self
            .post("chat/completions", &request)
            .await
            .map_err(RagError::Generation)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::Generation("No response content".to_string()))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

impl EmbeddingResponse {
    /// Vectors in input order; the API tags each with the index of its input
    fn into_ordered(mut self, expected: usize) -> std::result::Result<Vec<Embedding>, String> {
        if self.data.len() != expected {
            return Err(format!(
                "expected {} embeddings, got {}",
                expected,
                self.data.len()
            ));
        }

        self.data.sort_by_key(|item| item.index);
        Ok(self
            .data
            .into_iter()
            .map(|item| Embedding::new(item.embedding))
            .collect())
    }
}

#[derive(Deserialize, Debug)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}
