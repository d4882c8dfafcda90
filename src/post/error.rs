use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Invalid response from provider: {0}")]
    SchemaValidation(String),

    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    EmptyResult(String),

    #[error("{0}")]
    ImageLoad(String),
}

impl GenerationError {
    /// Message shown to the user once the pipeline gives up.
    pub fn user_message(&self) -> String {
        format!("Post generation failed: {}", self)
    }
}
