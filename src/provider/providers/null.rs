use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use tracing::info;

use crate::data_uri;
use crate::post::{GenerationError, PostContent};
use crate::provider::{ImageProvider, TextProvider, validate_image_prompt};
use crate::watermark::encode_jpeg;

const IMAGE_SIZE: u32 = 512;

/// Offline provider returning a fixed verse and a plain saffron image.
/// Useful for local development without an upstream credential.
pub struct NullProvider;

impl NullProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextProvider for NullProvider {
    async fn generate_text(&self) -> Result<PostContent, GenerationError> {
        info!("NULL PROVIDER - returning fixed sloka");
        Ok(PostContent {
            verse_text: "रामो विग्रहवान् धर्मः साधुः सत्यपराक्रमः।\n\
                         राजा सर्वस्य लोकस्य देवानामिव वासवः॥"
                .to_string(),
            transliteration: "രാമോ വിഗ്രഹവാൻ ധർമഃ സാധുഃ സത്യപരാക്രമഃ।\n\
                              രാജാ സർവസ്യ ലോകസ്യ ദേവാനാമിവ വാസവഃ॥"
                .to_string(),
            primary_translation: "ശ്രീരാമൻ ധർമ്മത്തിന്റെ മൂർത്തീഭാവമാണ്.".to_string(),
            secondary_translation: "Rama is righteousness incarnate, virtuous and truly \
                                    valiant, king of all the world as Indra is of the gods."
                .to_string(),
            image_prompt: "Lord Rama standing at dawn on the shore of the ocean".to_string(),
        })
    }

    fn name(&self) -> &str {
        "Null Provider (Offline)"
    }
}

#[async_trait]
impl ImageProvider for NullProvider {
    async fn generate_image(&self, image_prompt: &str) -> Result<String, GenerationError> {
        let image_prompt = validate_image_prompt(image_prompt)?;
        info!("NULL PROVIDER - rendering placeholder for: {}", image_prompt);

        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            IMAGE_SIZE,
            IMAGE_SIZE,
            Rgb([232, 140, 48]),
        ));
        let bytes = encode_jpeg(&image, 90)
            .map_err(|e| GenerationError::EmptyResult(format!("Placeholder encode failed: {}", e)))?;
        Ok(data_uri::encode(data_uri::JPEG_MIME, &bytes))
    }

    fn name(&self) -> &str {
        "Null Provider (Offline)"
    }
}
