use crate::error::Result;

/// Produces a natural-language completion for a prompt.
///
/// One round-trip per call: no streaming and no retry. Failures surface as
/// [`RagError::Generation`](crate::error::RagError::Generation).
#[allow(async_fn_in_trait)]
pub trait GenerationProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
