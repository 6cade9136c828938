//! Model client trait
//!
//! 모델 호출 경계: prompt → text. 키는 호출마다 풀에서 받아 전달한다.

use crate::error::ProviderError;
use async_trait::async_trait;
use vibe_foundation::SecretString;

/// A language model that turns a prompt into text
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier (e.g., "gemini-1.5-flash")
    fn model_id(&self) -> &str;

    /// Single-turn, non-streaming generation with the given API key.
    ///
    /// The reply is returned verbatim; callers must not assume it is JSON.
    async fn generate_content(
        &self,
        api_key: &SecretString,
        prompt: &str,
    ) -> Result<String, ProviderError>;
}
