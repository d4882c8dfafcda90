use crate::Config;
use crate::provider::ProviderKind;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Watermark font not found, using bundled font: {0:?}")]
    WatermarkFontMissing(PathBuf),

    #[error("Provider credential not set in environment variable {0}")]
    ApiKeyMissing(String),

    #[error("JPEG quality must be between 1 and 100, got {0}")]
    InvalidJpegQuality(u8),

    #[error("Watermark text is empty")]
    EmptyWatermarkText,

    #[error("Image style template has no {{prompt}} placeholder")]
    ImageStyleWithoutPlaceholder,
}

impl StartupCheckError {
    /// Errors that make the server pointless to start.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::InvalidJpegQuality(_))
    }
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    let font_path = &config.watermark.font_path;
    if tokio::fs::try_exists(font_path).await.unwrap_or(false) {
        info!("Watermark font found: {:?}", font_path);
    } else {
        warn!("Watermark font missing: {:?}, the bundled font will be used", font_path);
        errors.push(StartupCheckError::WatermarkFontMissing(font_path.clone()));
    }

    if !(1..=100).contains(&config.watermark.jpeg_quality) {
        error!(
            "Invalid JPEG quality configured: {}",
            config.watermark.jpeg_quality
        );
        errors.push(StartupCheckError::InvalidJpegQuality(
            config.watermark.jpeg_quality,
        ));
    }

    if config.watermark.text.trim().is_empty() {
        warn!("Watermark text is empty, images will not be marked");
        errors.push(StartupCheckError::EmptyWatermarkText);
    }

    if !config.prompts.image_style.contains("{prompt}") {
        warn!("Image style template does not reference {{prompt}}");
        errors.push(StartupCheckError::ImageStyleWithoutPlaceholder);
    }

    match config.provider.kind {
        ProviderKind::Null => info!("Using offline null provider"),
        ProviderKind::Gemini => {
            if config.provider.api_key_from_env().is_some() {
                info!(
                    "Provider credential found in {}",
                    config.provider.api_key_env
                );
            } else {
                warn!(
                    "{} is not set, generation requests will fail",
                    config.provider.api_key_env
                );
                errors.push(StartupCheckError::ApiKeyMissing(
                    config.provider.api_key_env.clone(),
                ));
            }
        }
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
