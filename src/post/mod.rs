pub mod core;
pub mod error;
pub mod types;

pub use core::PostGenerator;
pub use error::GenerationError;
pub use types::{
    DisplayablePost, GenerateOptions, GenerationPhase, OrchestratorState, PostContent,
    StateSnapshot,
};

#[cfg(test)]
mod tests;
