use super::{error::GenerationError, types::*};
use crate::provider::Providers;
use crate::watermark::Watermarker;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Runs the text → image → watermark pipeline and owns the resulting state.
///
/// Every call to [`PostGenerator::generate_post`] takes a new generation
/// token. State updates are only accepted from the run holding the current
/// token, so a newer call supersedes an older one no matter which finishes
/// first. In-flight provider calls of a superseded run are not aborted; the
/// run stops at its next step and its results are dropped.
pub struct PostGenerator {
    providers: Providers,
    watermarker: Watermarker,
    watermark_text: String,
    state: watch::Sender<StateSnapshot>,
}

impl PostGenerator {
    pub fn new(
        providers: Providers,
        watermarker: Watermarker,
        watermark_text: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(StateSnapshot::default());
        Self {
            providers,
            watermarker,
            watermark_text: watermark_text.into(),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.borrow().clone()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state.borrow().state.clone()
    }

    pub fn current_token(&self) -> u64 {
        self.state.borrow().token
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Generate one post. Progress is published to subscribers; the return
    /// value is the generation token of this run.
    pub async fn generate_post(&self, options: GenerateOptions) -> u64 {
        let token = self.begin();
        self.execute(token, options).await;
        token
    }

    /// Start a generation on the runtime and return its token right away.
    pub fn spawn_post(self: &Arc<Self>, options: GenerateOptions) -> u64 {
        let token = self.begin();
        let generator = Arc::clone(self);
        tokio::spawn(async move {
            generator.execute(token, options).await;
        });
        token
    }

    async fn execute(&self, token: u64, options: GenerateOptions) {
        info!(
            token,
            include_image = options.include_image,
            "Starting post generation"
        );

        if let Err(e) = self.run(token, options).await {
            error!(token, "Post generation failed: {}", e);
            self.publish(
                token,
                OrchestratorState::Error {
                    message: e.user_message(),
                },
            );
        }
    }

    async fn run(&self, token: u64, options: GenerateOptions) -> Result<(), GenerationError> {
        let content = self.providers.text.generate_text().await?;
        let mut post = DisplayablePost::new(content, options.include_image);

        if !options.include_image {
            self.publish(token, OrchestratorState::Done { post });
            return Ok(());
        }

        // The verse is shown while the image is still being made
        let visible = self.publish(
            token,
            OrchestratorState::Generating {
                phase: GenerationPhase::Image,
                post: Some(post.clone()),
            },
        );
        if !visible {
            return Ok(());
        }

        let raw_image_uri = self
            .providers
            .image
            .generate_image(&post.content.image_prompt)
            .await?;

        if !self.publish(
            token,
            OrchestratorState::Watermarking { post: post.clone() },
        ) {
            return Ok(());
        }

        let watermarked = self
            .watermarker
            .apply_watermark(&raw_image_uri, &self.watermark_text)
            .await?;

        post.image_url = Some(watermarked);
        if self.publish(token, OrchestratorState::Done { post }) {
            info!(token, "Post generation completed");
        }
        Ok(())
    }

    /// Take a new token and reset to the first generating state.
    fn begin(&self) -> u64 {
        let mut token = 0;
        self.state.send_modify(|snapshot| {
            snapshot.token += 1;
            token = snapshot.token;
            snapshot.state = OrchestratorState::Generating {
                phase: GenerationPhase::Text,
                post: None,
            };
        });
        token
    }

    /// Replace the state if `token` is still current. Returns false for a
    /// superseded run.
    fn publish(&self, token: u64, next: OrchestratorState) -> bool {
        let accepted = self.state.send_if_modified(|snapshot| {
            if snapshot.token != token {
                return false;
            }
            snapshot.state = next;
            true
        });
        if !accepted {
            debug!(token, "Discarding result of superseded generation");
        }
        accepted
    }
}
