use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::data_uri;
use crate::post::{GenerationError, PostContent};
use crate::provider::{
    ImageProvider, PromptConfig, ProviderConfig, TextProvider, error_message_from_body,
    validate_image_prompt,
};

/// Talks to the Google Generative Language REST API.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
    prompts: PromptConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: Option<String>,
}

fn post_content_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "sanskrit_sloka": {
                "type": "STRING",
                "description": "An original four-line sloka from the Ramayana in Sanskrit (Devanagari script)."
            },
            "malayalam_transliteration": {
                "type": "STRING",
                "description": "The transliteration of the above Sanskrit sloka in Malayalam script."
            },
            "malayalam_meaning": {
                "type": "STRING",
                "description": "The meaning of the sloka in Malayalam."
            },
            "english_meaning": {
                "type": "STRING",
                "description": "The meaning of the sloka in English."
            },
            "visual_prompt": {
                "type": "STRING",
                "description": "A detailed, vivid, artistic description for an image generator to create a picture that visually represents the sloka's theme, mood, and characters."
            }
        },
        "required": [
            "sanskrit_sloka",
            "malayalam_transliteration",
            "malayalam_meaning",
            "english_meaning",
            "visual_prompt"
        ]
    })
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        config: &ProviderConfig,
        prompts: &PromptConfig,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Provider(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            prompts: prompts.clone(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    /// Send one request and return the body of a successful response.
    async fn post_json(&self, url: &str, body: &Value) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("Request to generative provider failed: {}", e);
                GenerationError::Provider(format!("Failed to reach provider: {}", e))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            GenerationError::Provider(format!("Failed to read provider response: {}", e))
        })?;

        if !status.is_success() {
            error!("Generative provider returned {}", status);
            return Err(GenerationError::Provider(error_message_from_body(
                &text,
                &format!("Provider request failed with status {}", status),
            )));
        }

        Ok(text)
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    async fn generate_text(&self) -> Result<PostContent, GenerationError> {
        info!("Generating text content with {}", self.text_model);

        let body = json!({
            "systemInstruction": { "parts": [{ "text": self.prompts.system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": self.prompts.text_instruction }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": post_content_schema(),
            },
        });

        let text = self
            .post_json(&self.model_url(&self.text_model, "generateContent"), &body)
            .await?;

        let response: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::SchemaValidation(e.to_string()))?;

        let answer: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if answer.trim().is_empty() {
            return Err(GenerationError::SchemaValidation(
                "provider returned no text".to_string(),
            ));
        }

        let content = PostContent::from_json(&answer)?;
        info!("Text content generated successfully");
        Ok(content)
    }

    fn name(&self) -> &str {
        "Google Gemini"
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    async fn generate_image(&self, image_prompt: &str) -> Result<String, GenerationError> {
        let image_prompt = validate_image_prompt(image_prompt)?;
        info!("Generating image with {}", self.image_model);
        debug!("Image prompt: {}", image_prompt);

        let body = json!({
            "instances": [{ "prompt": self.prompts.styled_image_prompt(image_prompt) }],
            "parameters": {
                "sampleCount": 1,
                "outputMimeType": data_uri::JPEG_MIME,
                "aspectRatio": "1:1",
            },
        });

        let text = self
            .post_json(&self.model_url(&self.image_model, "predict"), &body)
            .await?;

        let response: PredictResponse = serde_json::from_str(&text).map_err(|e| {
            GenerationError::Provider(format!("Malformed image response: {}", e))
        })?;

        let payload = response
            .predictions
            .into_iter()
            .next()
            .and_then(|p| p.bytes_base64_encoded)
            .filter(|b64| !b64.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::EmptyResult(
                    "Image generation failed to produce an image.".to_string(),
                )
            })?;

        debug!("Image generated: {} base64 bytes", payload.len());
        Ok(data_uri::from_base64(data_uri::JPEG_MIME, payload.trim()))
    }

    fn name(&self) -> &str {
        "Google Imagen"
    }
}
