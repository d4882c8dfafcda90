use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::post::{GenerationError, PostContent};
use crate::provider::{ImageProvider, TextProvider, error_message_from_body, validate_image_prompt};

const TEXT_FALLBACK: &str = "Failed to generate sloka text.";
const IMAGE_FALLBACK: &str = "Failed to generate the image.";

/// Uses a running slokapost server as the provider, so the upstream
/// credential stays on the server.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    visual_prompt: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(rename = "rawImageUrl")]
    raw_image_url: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Provider(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> Result<String, GenerationError> {
        let response = request.send().await.map_err(|e| {
            error!("Request to {} failed: {}", self.base_url, e);
            GenerationError::Provider(fallback.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("Failed to read response from {}: {}", self.base_url, e);
            GenerationError::Provider(format!("Failed to read server response: {}", e))
        })?;
        if !status.is_success() {
            debug!("Server answered {}: {}", status, body);
            return Err(GenerationError::Provider(error_message_from_body(
                &body, fallback,
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl TextProvider for ApiClient {
    async fn generate_text(&self) -> Result<PostContent, GenerationError> {
        let url = format!("{}/api/generate-text", self.base_url);
        let body = self.send(self.client.post(&url), TEXT_FALLBACK).await?;
        PostContent::from_json(&body)
    }

    fn name(&self) -> &str {
        "slokapost server"
    }
}

#[async_trait]
impl ImageProvider for ApiClient {
    async fn generate_image(&self, image_prompt: &str) -> Result<String, GenerationError> {
        let visual_prompt = validate_image_prompt(image_prompt)?;
        let url = format!("{}/api/generate-image", self.base_url);
        let request = self.client.post(&url).json(&ImageRequest { visual_prompt });
        let body = self.send(request, IMAGE_FALLBACK).await?;

        let response: ImageResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Provider(format!("Malformed image response: {}", e)))?;

        response
            .raw_image_url
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::EmptyResult(
                    "Image generation failed to produce an image.".to_string(),
                )
            })
    }

    fn name(&self) -> &str {
        "slokapost server"
    }
}
