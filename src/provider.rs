use crate::config::ProviderConfig;
use crate::embeddings::{Embedding, EmbeddingProvider};
use crate::error::Result;
use crate::gemini::GeminiClient;
use crate::generation::GenerationProvider;
use crate::openai::OpenAiClient;

/// The hosted model service selected at startup.
///
/// One value serves as both the embedding and the generation provider.
#[derive(Clone)]
pub enum ModelProvider {
    Gemini(GeminiClient),
    OpenAi(OpenAiClient),
}

impl ModelProvider {
    pub fn new(config: ProviderConfig) -> Self {
        match config {
            ProviderConfig::Gemini(config) => ModelProvider::Gemini(GeminiClient::new(config)),
            ProviderConfig::OpenAi(config) => ModelProvider::OpenAi(OpenAiClient::new(config)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelProvider::Gemini(_) => "gemini",
            ModelProvider::OpenAi(_) => "openai",
        }
    }
}

impl EmbeddingProvider for ModelProvider {
    fn dimension(&self) -> usize {
        match self {
            ModelProvider::Gemini(client) => client.dimension(),
            ModelProvider::OpenAi(client) => client.dimension(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        match self {
            ModelProvider::Gemini(client) => client.embed(text).await,
            ModelProvider::OpenAi(client) => client.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        match self {
            ModelProvider::Gemini(client) => client.embed_batch(texts).await,
            ModelProvider::OpenAi(client) => client.embed_batch(texts).await,
        }
    }
}

impl GenerationProvider for ModelProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        match self {
            ModelProvider::Gemini(client) => client.complete(system_prompt, user_prompt).await,
            ModelProvider::OpenAi(client) => client.complete(system_prompt, user_prompt).await,
        }
    }
}
