use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Null,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Name of the environment variable holding the upstream credential.
    pub api_key_env: String,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            api_key_env: "API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            image_model: "imagen-3.0-generate-002".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    pub fn api_key_from_env(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Fixed prompts sent upstream. Kept in configuration so tests and
/// deployments can substitute their own.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptConfig {
    pub system_instruction: String,
    pub text_instruction: String,
    /// Template wrapped around every image prompt; `{prompt}` is replaced.
    pub image_style: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_instruction: "You are an expert on the Ramayana. Your task is to generate a \
                four-line Sanskrit sloka, provide its Malayalam transliteration and meaning, its \
                English meaning, and a creative visual prompt. You must respond strictly in the \
                provided JSON schema format."
                .to_string(),
            text_instruction: "Generate an original four-line sloka from the Ramayana, along \
                with its translations and a creative visual prompt for an image generator."
                .to_string(),
            image_style: "Epic, cinematic, high detail photo of: {prompt}. The style should be \
                reminiscent of classical Indian art, with rich colors and dramatic lighting."
                .to_string(),
        }
    }
}

impl PromptConfig {
    pub fn styled_image_prompt(&self, prompt: &str) -> String {
        self.image_style.replace("{prompt}", prompt.trim())
    }
}
