use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::AppState;
use crate::data_uri;
use crate::post::{GenerateOptions, PostContent, PostGenerator, StateSnapshot};
use crate::provider::Providers;

pub const MISSING_API_KEY: &str = "Server configuration error: API key is missing.";
pub const MISSING_VISUAL_PROMPT: &str = "Missing 'visual_prompt' in the request body.";
pub const DOWNLOAD_FILENAME: &str = "ramayana_post.jpeg";

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct ImageRequest {
    visual_prompt: Option<String>,
}

#[derive(Serialize)]
pub struct ImageResponse {
    #[serde(rename = "rawImageUrl")]
    raw_image_url: String,
}

#[derive(Serialize)]
pub struct StartResponse {
    token: u64,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

fn require_providers(app_state: &AppState) -> Result<&Providers, ApiError> {
    app_state.providers.as_ref().ok_or_else(|| {
        error!("Provider credential not configured");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, MISSING_API_KEY)
    })
}

fn require_generator(app_state: &AppState) -> Result<&Arc<PostGenerator>, ApiError> {
    app_state.generator.as_ref().ok_or_else(|| {
        error!("Provider credential not configured");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, MISSING_API_KEY)
    })
}

pub async fn generate_text_handler(
    State(app_state): State<AppState>,
) -> Result<Json<PostContent>, ApiError> {
    let providers = require_providers(&app_state)?;

    info!("Generating text content...");
    match providers.text.generate_text().await {
        Ok(content) => {
            info!("Text content generated successfully");
            Ok(Json(content))
        }
        Err(e) => {
            error!("Error in /api/generate-text: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to generate text: {}", e),
            ))
        }
    }
}

pub async fn generate_image_handler(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<Json<ImageResponse>, ApiError> {
    let providers = require_providers(&app_state)?;

    let visual_prompt = serde_json::from_slice::<ImageRequest>(&body)
        .ok()
        .and_then(|request| request.visual_prompt)
        .filter(|prompt| !prompt.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, MISSING_VISUAL_PROMPT))?;

    info!("Generating image with prompt: {}", visual_prompt);
    match providers.image.generate_image(&visual_prompt).await {
        Ok(raw_image_url) => {
            info!("Image generated successfully");
            Ok(Json(ImageResponse { raw_image_url }))
        }
        Err(e) => {
            error!("Error in /api/generate-image: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to generate image: {}", e),
            ))
        }
    }
}

/// Kick off a generation on the shared generator. An empty body means the
/// default options.
pub async fn start_post_handler(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let generator = require_generator(&app_state)?;

    let options = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateOptions::default()
    } else {
        serde_json::from_slice::<GenerateOptions>(&body).map_err(|e| {
            warn!("Rejected post request body: {}", e);
            api_error(StatusCode::BAD_REQUEST, "Invalid request body.")
        })?
    };

    let token = generator.spawn_post(options);
    Ok((StatusCode::ACCEPTED, Json(StartResponse { token })))
}

pub async fn post_state_handler(
    State(app_state): State<AppState>,
) -> Result<Json<StateSnapshot>, ApiError> {
    let generator = require_generator(&app_state)?;
    Ok(Json(generator.snapshot()))
}

/// The copy action: the current post as plain text.
pub async fn post_text_handler(State(app_state): State<AppState>) -> Result<String, ApiError> {
    let generator = require_generator(&app_state)?;
    generator
        .state()
        .post()
        .map(|post| post.content.clipboard_text())
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No post available."))
}

/// The download action: the watermarked image as an attachment.
pub async fn post_image_handler(State(app_state): State<AppState>) -> Result<Response, ApiError> {
    let generator = require_generator(&app_state)?;

    let image_url = generator
        .state()
        .post()
        .and_then(|post| post.image_url.clone())
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No image available."))?;

    let image = data_uri::decode(&image_url).map_err(|e| {
        error!("Stored image is not a valid data URI: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Stored image is corrupt.")
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, image.mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_FILENAME),
            ),
        ],
        image.bytes,
    )
        .into_response())
}
