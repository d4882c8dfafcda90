use super::error::GenerationError;
use serde::{Deserialize, Serialize};

/// One generated verse with its translations and the prompt used for the
/// accompanying image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    #[serde(rename = "sanskrit_sloka")]
    pub verse_text: String,
    #[serde(rename = "malayalam_transliteration")]
    pub transliteration: String,
    #[serde(rename = "malayalam_meaning")]
    pub primary_translation: String,
    #[serde(rename = "english_meaning")]
    pub secondary_translation: String,
    #[serde(rename = "visual_prompt")]
    pub image_prompt: String,
}

/// Wire shape before validation. Every field is optional here so that a
/// missing field can be reported by name instead of as a generic serde error.
#[derive(Debug, Default, Deserialize)]
struct RawPostContent {
    sanskrit_sloka: Option<String>,
    malayalam_transliteration: Option<String>,
    malayalam_meaning: Option<String>,
    english_meaning: Option<String>,
    visual_prompt: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String, GenerationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(GenerationError::SchemaValidation(format!(
            "field '{}' is empty",
            field
        ))),
        None => Err(GenerationError::SchemaValidation(format!(
            "missing required field '{}'",
            field
        ))),
    }
}

impl PostContent {
    /// Parse and validate a provider answer. All five fields must be present
    /// and non-blank.
    pub fn from_json(text: &str) -> Result<Self, GenerationError> {
        let raw: RawPostContent = serde_json::from_str(text)
            .map_err(|e| GenerationError::SchemaValidation(e.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, GenerationError> {
        let raw: RawPostContent = serde_json::from_value(value)
            .map_err(|e| GenerationError::SchemaValidation(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPostContent) -> Result<Self, GenerationError> {
        Ok(Self {
            verse_text: required(raw.sanskrit_sloka, "sanskrit_sloka")?,
            transliteration: required(raw.malayalam_transliteration, "malayalam_transliteration")?,
            primary_translation: required(raw.malayalam_meaning, "malayalam_meaning")?,
            secondary_translation: required(raw.english_meaning, "english_meaning")?,
            image_prompt: required(raw.visual_prompt, "visual_prompt")?,
        })
    }

    /// Text placed on the clipboard by the copy action. The image prompt is
    /// never part of it.
    pub fn clipboard_text(&self) -> String {
        format!(
            "Sloka (Sanskrit):\n{}\n\n\
             Transliteration (Malayalam):\n{}\n\n\
             Malayalam Meaning:\n{}\n\n\
             English Meaning:\n\u{201c}{}\u{201d}\n\n\
             \u{2014} The Ramayana",
            self.verse_text,
            self.transliteration,
            self.primary_translation,
            self.secondary_translation
        )
        .trim()
        .to_string()
    }
}

/// The post as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayablePost {
    #[serde(flatten)]
    pub content: PostContent,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(rename = "imageRequested")]
    pub image_requested: bool,
}

impl DisplayablePost {
    pub fn new(content: PostContent, image_requested: bool) -> Self {
        Self {
            content,
            image_url: None,
            image_requested,
        }
    }

    /// Whether the download action can be offered right now.
    pub fn can_download(&self) -> bool {
        self.image_requested && self.image_url.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(rename = "includeImage", default = "default_include_image")]
    pub include_image: bool,
}

fn default_include_image() -> bool {
    true
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            include_image: default_include_image(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Generating {
        phase: GenerationPhase,
        post: Option<DisplayablePost>,
    },
    Watermarking {
        post: DisplayablePost,
    },
    Done {
        post: DisplayablePost,
    },
    Error {
        message: String,
    },
}

impl OrchestratorState {
    /// The post currently visible to the user, if any.
    pub fn post(&self) -> Option<&DisplayablePost> {
        match self {
            Self::Generating { post, .. } => post.as_ref(),
            Self::Watermarking { post } | Self::Done { post } => Some(post),
            Self::Idle | Self::Error { .. } => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Generating { .. } | Self::Watermarking { .. })
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Generating {
                phase: GenerationPhase::Text,
                ..
            } => "Generating sloka...",
            Self::Generating {
                phase: GenerationPhase::Image,
                ..
            } => "Generating image...",
            Self::Watermarking { .. } => "Applying watermark...",
            Self::Done { .. } => "Done",
            Self::Error { .. } => "Error",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// A published state together with the generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub token: u64,
    pub state: OrchestratorState,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            token: 0,
            state: OrchestratorState::Idle,
        }
    }
}
