use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{DynamicImage, ImageEncoder, Rgba, RgbaImage, codecs::jpeg::JpegEncoder};
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::data_uri;
use crate::post::GenerationError;

/// Rotation applied to the watermark, about 20 degrees counter-clockwise.
pub const WATERMARK_ANGLE: f32 = -0.349;
/// Canvas-style shadow blur; the Gaussian sigma is half of it.
pub const SHADOW_BLUR: f32 = 8.0;
pub const MIN_FONT_SIZE: u32 = 24;

/// Bold serif compiled into the binary, used when `font_path` is unreadable.
const BUNDLED_FONT: &[u8] = include_bytes!("../static/DejaVuSerif-Bold.ttf");

const FILL_ALPHA: f32 = 0.5;
const SHADOW_ALPHA: f32 = 0.7;
// Glyphs are drawn white on transparent white so bilinear rotation does not
// darken the edges.
const CLEAR_WHITE: Rgba<u8> = Rgba([255, 255, 255, 0]);
const CLEAR_BLACK: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Text stamped across every generated image.
    pub text: String,
    pub font_path: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: "www.annapoornainfo.com".to_string(),
            font_path: PathBuf::from("static/DejaVuSerif-Bold.ttf"),
            jpeg_quality: 92,
        }
    }
}

/// Watermark font size for an image of the given width.
pub fn watermark_font_size(width: u32) -> u32 {
    (width / 30).max(MIN_FONT_SIZE)
}

pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    // JPEG has no alpha channel
    let rgb_image = image.to_rgb8();
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    encoder.write_image(
        &rgb_image,
        rgb_image.width(),
        rgb_image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(bytes)
}

/// Decode a raw `data:` image URI.
pub fn decode_image(raw_image_uri: &str) -> Result<DynamicImage, GenerationError> {
    let decoded = data_uri::decode(raw_image_uri)
        .map_err(|e| GenerationError::ImageLoad(format!("Image failed to load for watermarking: {}", e)))?;
    image::load_from_memory(&decoded.bytes)
        .map_err(|e| GenerationError::ImageLoad(format!("Image failed to load for watermarking: {}", e)))
}

pub fn bundled_font() -> Result<FontArc, InvalidFont> {
    FontArc::try_from_slice(BUNDLED_FONT)
}

/// Stamps rotated, shadowed text over the centre of an image.
#[derive(Clone)]
pub struct Watermarker {
    font: FontArc,
    jpeg_quality: u8,
}

impl Watermarker {
    pub fn new(font: FontArc, jpeg_quality: u8) -> Self {
        Self { font, jpeg_quality }
    }

    /// Load the configured font, falling back to the bundled one.
    pub fn from_config(config: &WatermarkConfig) -> Result<Self, InvalidFont> {
        let font = match Self::load_font(&config.font_path) {
            Ok(font) => {
                info!("Watermark font loaded from {:?}", config.font_path);
                font
            }
            Err(e) => {
                warn!(
                    "Watermark font unavailable at {:?} ({}), using bundled font",
                    config.font_path, e
                );
                bundled_font()?
            }
        };
        Ok(Self::new(font, config.jpeg_quality))
    }

    pub fn load_font(path: &Path) -> Result<FontArc, Box<dyn std::error::Error + Send + Sync>> {
        let font_data = std::fs::read(path)?;
        let font = FontArc::try_from_vec(font_data)?;
        Ok(font)
    }

    /// Decode, mark and re-encode on the blocking pool.
    pub async fn apply_watermark(
        &self,
        raw_image_uri: &str,
        text: &str,
    ) -> Result<String, GenerationError> {
        let watermarker = self.clone();
        let raw_image_uri = raw_image_uri.to_string();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || watermarker.watermark_uri(&raw_image_uri, &text))
            .await
            .map_err(|e| GenerationError::ImageLoad(format!("Watermark task failed: {}", e)))?
    }

    pub fn watermark_uri(&self, raw_image_uri: &str, text: &str) -> Result<String, GenerationError> {
        let source = decode_image(raw_image_uri)?;
        let marked = self.composite(&source, text);

        let bytes = encode_jpeg(&DynamicImage::ImageRgba8(marked), self.jpeg_quality)
            .map_err(|e| GenerationError::ImageLoad(format!("Failed to encode watermarked image: {}", e)))?;
        debug!("Watermarked JPEG: {} bytes", bytes.len());

        Ok(data_uri::encode(data_uri::JPEG_MIME, &bytes))
    }

    /// Draw the watermark onto a canvas the size of `source`.
    pub fn composite(&self, source: &DynamicImage, text: &str) -> RgbaImage {
        let mut canvas = source.to_rgba8();
        let font = &self.font;
        if text.trim().is_empty() {
            return canvas;
        }

        let scale = PxScale::from(watermark_font_size(canvas.width()) as f32);
        let (text_width, text_height) = text_size(scale, font, text);

        // Square layer that holds the text at any angle plus the shadow spread
        let spread = (SHADOW_BLUR * 2.0).ceil() as u32;
        let diagonal = ((text_width as f32).powi(2) + (text_height as f32).powi(2))
            .sqrt()
            .ceil() as u32;
        let side = diagonal + 2 * spread;

        let mut glyphs = RgbaImage::from_pixel(side, side, CLEAR_WHITE);
        let x = (side as i32 - text_width as i32) / 2;
        let y = (side as i32 - text_height as i32) / 2;
        draw_text_mut(&mut glyphs, Rgba([255, 255, 255, 255]), x, y, scale, font, text);

        let glyphs = rotate_about_center(&glyphs, WATERMARK_ANGLE, Interpolation::Bilinear, CLEAR_WHITE);
        let shadow = shadow_layer(&glyphs);

        let origin_x = i64::from(canvas.width() / 2) - i64::from(side / 2);
        let origin_y = i64::from(canvas.height() / 2) - i64::from(side / 2);

        // The shadow takes the fill alpha too, as a 2D canvas does
        blend_layer(&mut canvas, &shadow, origin_x, origin_y, FILL_ALPHA);
        blend_layer(&mut canvas, &glyphs, origin_x, origin_y, FILL_ALPHA);

        canvas
    }
}

fn shadow_layer(glyphs: &RgbaImage) -> RgbaImage {
    let mut shadow = RgbaImage::from_pixel(glyphs.width(), glyphs.height(), CLEAR_BLACK);
    for (x, y, pixel) in glyphs.enumerate_pixels() {
        let alpha = (pixel[3] as f32 * SHADOW_ALPHA).round() as u8;
        shadow.put_pixel(x, y, Rgba([0, 0, 0, alpha]));
    }
    gaussian_blur_f32(&shadow, SHADOW_BLUR / 2.0)
}

fn blend_layer(target: &mut RgbaImage, layer: &RgbaImage, origin_x: i64, origin_y: i64, opacity: f32) {
    let x_start = origin_x.max(0);
    let y_start = origin_y.max(0);
    let x_end = (origin_x + i64::from(layer.width())).min(i64::from(target.width()));
    let y_end = (origin_y + i64::from(layer.height())).min(i64::from(target.height()));

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let layer_pixel = layer.get_pixel((tx - origin_x) as u32, (ty - origin_y) as u32);
            if layer_pixel[3] == 0 {
                continue;
            }
            let target_pixel = target.get_pixel_mut(tx as u32, ty as u32);
            *target_pixel = blend_pixels(*target_pixel, *layer_pixel, opacity);
        }
    }
}

/// Porter-Duff "over" with an extra opacity on the foreground.
fn blend_pixels(background: Rgba<u8>, foreground: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let fg_alpha = (foreground[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    let bg_alpha = background[3] as f32 / 255.0;
    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |fg: u8, bg: u8| -> u8 {
        let fg = fg as f32 / 255.0;
        let bg = bg as f32 / 255.0;
        let result = (fg * fg_alpha + bg * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(foreground[0], background[0]),
        channel(foreground[1], background[1]),
        channel(foreground[2], background[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}
