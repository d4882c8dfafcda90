pub mod config;
pub mod providers;

pub use config::*;

use crate::post::{GenerationError, PostContent};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Produce one validated post. The instruction is fixed by the provider.
    async fn generate_text(&self) -> Result<PostContent, GenerationError>;
    fn name(&self) -> &str;
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Produce a `data:image/jpeg;base64,...` URI for the given prompt.
    async fn generate_image(&self, image_prompt: &str) -> Result<String, GenerationError>;
    fn name(&self) -> &str;
}

pub type DynTextProvider = Arc<dyn TextProvider>;
pub type DynImageProvider = Arc<dyn ImageProvider>;

/// The pair of adapters a post is generated with.
#[derive(Clone)]
pub struct Providers {
    pub text: DynTextProvider,
    pub image: DynImageProvider,
}

impl Providers {
    pub fn new(text: DynTextProvider, image: DynImageProvider) -> Self {
        Self { text, image }
    }

    /// One adapter serving both roles.
    pub fn from_shared<P>(provider: Arc<P>) -> Self
    where
        P: TextProvider + ImageProvider + 'static,
    {
        Self {
            text: provider.clone(),
            image: provider,
        }
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("text", &self.text.name())
            .field("image", &self.image.name())
            .finish()
    }
}

/// Build the server-side providers. Returns `Ok(None)` when the upstream
/// credential is not configured; requests then fail closed.
pub fn create_providers(
    config: &ProviderConfig,
    prompts: &PromptConfig,
) -> Result<Option<Providers>, GenerationError> {
    match config.kind {
        ProviderKind::Null => Ok(Some(Providers::from_shared(Arc::new(
            providers::null::NullProvider::new(),
        )))),
        ProviderKind::Gemini => match config.api_key_from_env() {
            Some(api_key) => Ok(Some(Providers::from_shared(Arc::new(
                providers::gemini::GeminiProvider::new(api_key, config, prompts)?,
            )))),
            None => {
                warn!(
                    "{} environment variable not set, generation endpoints will fail",
                    config.api_key_env
                );
                Ok(None)
            }
        },
    }
}

pub(crate) fn validate_image_prompt(image_prompt: &str) -> Result<&str, GenerationError> {
    let trimmed = image_prompt.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::SchemaValidation(
            "image prompt must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Pull a human readable message out of an error body, falling back to a
/// generic one. Understands both `{message}` and the upstream
/// `{error: {message}}` shape.
pub(crate) fn error_message_from_body(body: &str, fallback: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error").and_then(|e| e.get("message")))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
