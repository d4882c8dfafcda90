#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::data_uri;
    use crate::provider::{ImageProvider, Providers, TextProvider};
    use crate::watermark::{Watermarker, encode_jpeg};
    use async_trait::async_trait;
    use image::{DynamicImage, GenericImageView, RgbImage};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    const WATERMARK: &str = "www.example.com";

    fn sample_content(tag: &str) -> PostContent {
        PostContent {
            verse_text: format!("A{}", tag),
            transliteration: format!("B{}", tag),
            primary_translation: format!("C{}", tag),
            secondary_translation: format!("D{}", tag),
            image_prompt: "sunset".to_string(),
        }
    }

    fn jpeg_uri(width: u32, height: u32) -> String {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([90, 40, 10])));
        data_uri::encode(data_uri::JPEG_MIME, &encode_jpeg(&image, 90).unwrap())
    }

    fn watermarker() -> Watermarker {
        Watermarker::new(
            Watermarker::load_font(Path::new("static/DejaVuSerif-Bold.ttf")).unwrap(),
            92,
        )
    }

    /// Text provider answering from a raw JSON body, the way a provider
    /// response is validated.
    struct JsonText {
        body: String,
        calls: AtomicUsize,
    }

    impl JsonText {
        fn new(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body: body.to_string(),
                calls: AtomicUsize::new(0),
            })
        }

        fn from_content(content: &PostContent) -> Arc<Self> {
            Self::new(&serde_json::to_string(content).unwrap())
        }
    }

    #[async_trait]
    impl TextProvider for JsonText {
        async fn generate_text(&self) -> Result<PostContent, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PostContent::from_json(&self.body)
        }

        fn name(&self) -> &str {
            "json"
        }
    }

    struct FailingText;

    #[async_trait]
    impl TextProvider for FailingText {
        async fn generate_text(&self) -> Result<PostContent, GenerationError> {
            Err(GenerationError::Provider("quota exceeded".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Each call waits for the answer sent through its own channel.
    struct GatedText {
        answers: Mutex<VecDeque<oneshot::Receiver<Result<PostContent, GenerationError>>>>,
    }

    impl GatedText {
        fn new(count: usize) -> (Arc<Self>, Vec<oneshot::Sender<Result<PostContent, GenerationError>>>) {
            let mut senders = Vec::new();
            let mut receivers = VecDeque::new();
            for _ in 0..count {
                let (tx, rx) = oneshot::channel();
                senders.push(tx);
                receivers.push_back(rx);
            }
            (
                Arc::new(Self {
                    answers: Mutex::new(receivers),
                }),
                senders,
            )
        }
    }

    #[async_trait]
    impl TextProvider for GatedText {
        async fn generate_text(&self) -> Result<PostContent, GenerationError> {
            let answer = self.answers.lock().unwrap().pop_front();
            match answer {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(GenerationError::Provider("dropped".to_string()))),
                None => Err(GenerationError::Provider("no more answers".to_string())),
            }
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    struct StubImage {
        result: Result<String, GenerationError>,
        prompts: Mutex<Vec<String>>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl StubImage {
        fn new(result: Result<String, GenerationError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                prompts: Mutex::new(Vec::new()),
                gate: Mutex::new(None),
            })
        }

        fn gated(result: Result<String, GenerationError>) -> (Arc<Self>, oneshot::Sender<()>) {
            let (tx, rx) = oneshot::channel();
            let stub = Arc::new(Self {
                result,
                prompts: Mutex::new(Vec::new()),
                gate: Mutex::new(Some(rx)),
            });
            (stub, tx)
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ImageProvider for StubImage {
        async fn generate_image(&self, image_prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(image_prompt.to_string());
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.result.clone()
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn generator(text: Arc<dyn TextProvider>, image: Arc<dyn ImageProvider>) -> PostGenerator {
        PostGenerator::new(Providers::new(text, image), watermarker(), WATERMARK)
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let generator = generator(
            JsonText::from_content(&sample_content("")),
            StubImage::new(Ok(jpeg_uri(8, 8))),
        );
        assert_eq!(generator.snapshot(), StateSnapshot::default());
        assert_eq!(generator.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_text_only_never_calls_image_provider() {
        let image = StubImage::new(Ok(jpeg_uri(8, 8)));
        let generator = generator(JsonText::from_content(&sample_content("")), image.clone());

        generator
            .generate_post(GenerateOptions {
                include_image: false,
            })
            .await;

        assert_eq!(image.calls(), 0);
        match generator.state() {
            OrchestratorState::Done { post } => {
                assert_eq!(post.image_url, None);
                assert!(!post.image_requested);
                assert!(!post.can_download());
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_with_image() {
        let image = StubImage::new(Ok(jpeg_uri(512, 512)));
        let generator = generator(JsonText::from_content(&sample_content("")), image.clone());

        let token = generator
            .generate_post(GenerateOptions {
                include_image: true,
            })
            .await;

        assert_eq!(token, 1);
        assert_eq!(image.prompts.lock().unwrap().as_slice(), ["sunset".to_string()]);

        let post = match generator.state() {
            OrchestratorState::Done { post } => post,
            other => panic!("expected Done, got {:?}", other),
        };
        assert_eq!(post.content.verse_text, "A");
        assert_eq!(post.content.transliteration, "B");
        assert_eq!(post.content.primary_translation, "C");
        assert_eq!(post.content.secondary_translation, "D");
        assert!(post.image_requested);
        assert!(post.can_download());

        let decoded = data_uri::decode(post.image_url.as_deref().unwrap()).unwrap();
        assert_eq!(decoded.mime_type, "image/jpeg");
        let image = image::load_from_memory(&decoded.bytes).unwrap();
        assert_eq!(image.dimensions(), (512, 512));
    }

    #[tokio::test]
    async fn test_failing_image_discards_visible_post() {
        let generator = generator(
            JsonText::from_content(&sample_content("")),
            StubImage::new(Err(GenerationError::EmptyResult(
                "Image generation failed to produce an image.".to_string(),
            ))),
        );

        generator.generate_post(GenerateOptions::default()).await;

        let state = generator.state();
        assert_eq!(state.post(), None);
        assert_eq!(
            state.error(),
            Some("Post generation failed: Image generation failed to produce an image.")
        );
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_failing_text_reports_provider_message() {
        let image = StubImage::new(Ok(jpeg_uri(8, 8)));
        let generator = generator(Arc::new(FailingText), image.clone());

        generator.generate_post(GenerateOptions::default()).await;

        assert_eq!(
            generator.state(),
            OrchestratorState::Error {
                message: "Post generation failed: quota exceeded".to_string()
            }
        );
        assert_eq!(image.calls(), 0);
    }

    #[tokio::test]
    async fn test_each_missing_field_is_schema_error_before_image_step() {
        let full = serde_json::to_value(sample_content("")).unwrap();
        for field in [
            "sanskrit_sloka",
            "malayalam_transliteration",
            "malayalam_meaning",
            "english_meaning",
            "visual_prompt",
        ] {
            let mut body = full.clone();
            body.as_object_mut().unwrap().remove(field);

            let image = StubImage::new(Ok(jpeg_uri(8, 8)));
            let generator = generator(JsonText::new(&body.to_string()), image.clone());
            generator.generate_post(GenerateOptions::default()).await;

            let state = generator.state();
            let message = state.error().unwrap_or_default();
            assert!(message.starts_with("Post generation failed: Invalid response"), "{}", message);
            assert!(message.contains(field), "{}", message);
            assert_eq!(image.calls(), 0, "image step reached without {}", field);
        }
    }

    #[tokio::test]
    async fn test_undecodable_image_fails_in_watermark_step() {
        let generator = generator(
            JsonText::from_content(&sample_content("")),
            StubImage::new(Ok("data:image/jpeg;base64,bm90IGFuIGltYWdl".to_string())),
        );

        generator.generate_post(GenerateOptions::default()).await;

        let state = generator.state();
        assert_eq!(state.post(), None);
        assert!(
            state
                .error()
                .unwrap_or_default()
                .starts_with("Post generation failed: Image failed to load for watermarking")
        );
    }

    #[tokio::test]
    async fn test_text_is_visible_while_image_is_pending() {
        let (image, release) = StubImage::gated(Ok(jpeg_uri(64, 64)));
        let generator = Arc::new(generator(
            JsonText::from_content(&sample_content("")),
            image.clone(),
        ));
        let mut updates = generator.subscribe();

        let task = tokio::spawn({
            let generator = generator.clone();
            async move { generator.generate_post(GenerateOptions::default()).await }
        });

        loop {
            updates.changed().await.unwrap();
            let state = updates.borrow_and_update().state.clone();
            if let OrchestratorState::Generating {
                phase: GenerationPhase::Image,
                post,
            } = state
            {
                let post = post.expect("text should be published before the image step");
                assert_eq!(post.content.verse_text, "A");
                assert_eq!(post.image_url, None);
                assert!(post.image_requested);
                break;
            }
        }

        release.send(()).unwrap();
        task.await.unwrap();

        match generator.state() {
            OrchestratorState::Done { post } => {
                assert_eq!(post.content, sample_content(""));
                assert!(post.image_url.is_some());
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_generation_clears_previous_error() {
        let (text, senders) = GatedText::new(2);
        let generator = Arc::new(generator(text, StubImage::new(Ok(jpeg_uri(8, 8)))));
        let mut senders = senders.into_iter();

        senders
            .next()
            .unwrap()
            .send(Err(GenerationError::Provider("boom".to_string())))
            .unwrap();
        generator.generate_post(GenerateOptions::default()).await;
        assert!(generator.state().error().is_some());

        let mut updates = generator.subscribe();
        let task = tokio::spawn({
            let generator = generator.clone();
            async move {
                generator
                    .generate_post(GenerateOptions {
                        include_image: false,
                    })
                    .await
            }
        });

        updates.changed().await.unwrap();
        let snapshot = updates.borrow_and_update().clone();
        assert_eq!(snapshot.token, 2);
        assert_eq!(
            snapshot.state,
            OrchestratorState::Generating {
                phase: GenerationPhase::Text,
                post: None
            }
        );

        senders.next().unwrap().send(Ok(sample_content(""))).unwrap();
        assert_eq!(task.await.unwrap(), 2);
        assert!(matches!(generator.state(), OrchestratorState::Done { .. }));
    }

    async fn race(second_finishes_first: bool) -> PostGenerator {
        let (text, senders) = GatedText::new(2);
        let generator = generator(text, StubImage::new(Ok(jpeg_uri(8, 8))));
        let mut senders = senders.into_iter();
        let first = senders.next().unwrap();
        let second = senders.next().unwrap();

        let text_only = GenerateOptions {
            include_image: false,
        };

        let driver = async move {
            if second_finishes_first {
                second.send(Ok(sample_content("-second"))).unwrap();
                tokio::task::yield_now().await;
                first.send(Ok(sample_content("-first"))).unwrap();
            } else {
                first.send(Ok(sample_content("-first"))).unwrap();
                tokio::task::yield_now().await;
                second.send(Ok(sample_content("-second"))).unwrap();
            }
        };

        let (first_token, second_token, ()) = tokio::join!(
            generator.generate_post(text_only),
            generator.generate_post(text_only),
            driver
        );
        assert_eq!((first_token, second_token), (1, 2));
        generator
    }

    #[tokio::test]
    async fn test_later_call_wins_when_it_finishes_first() {
        let generator = race(true).await;
        let snapshot = generator.snapshot();
        assert_eq!(snapshot.token, 2);
        assert_eq!(
            snapshot.state.post().map(|p| p.content.verse_text.as_str()),
            Some("A-second")
        );
    }

    #[tokio::test]
    async fn test_later_call_wins_when_it_finishes_last() {
        let generator = race(false).await;
        let snapshot = generator.snapshot();
        assert_eq!(snapshot.token, 2);
        assert_eq!(
            snapshot.state.post().map(|p| p.content.verse_text.as_str()),
            Some("A-second")
        );
    }

    #[tokio::test]
    async fn test_superseded_run_stops_before_image_step() {
        let (text, senders) = GatedText::new(2);
        let image = StubImage::new(Ok(jpeg_uri(8, 8)));
        let generator = generator(text, image.clone());
        let mut senders = senders.into_iter();
        let first = senders.next().unwrap();
        let second = senders.next().unwrap();

        let driver = async move {
            second.send(Ok(sample_content("-second"))).unwrap();
            tokio::task::yield_now().await;
            first.send(Ok(sample_content("-first"))).unwrap();
        };

        tokio::join!(
            generator.generate_post(GenerateOptions::default()),
            generator.generate_post(GenerateOptions {
                include_image: false
            }),
            driver
        );

        // Only the current run may reach the image step
        assert_eq!(image.calls(), 0);
        assert!(matches!(
            generator.state(),
            OrchestratorState::Done { ref post } if post.content.verse_text == "A-second"
        ));
    }

    #[test]
    fn test_clipboard_text_layout() {
        let text = sample_content("").clipboard_text();
        assert_eq!(
            text,
            "Sloka (Sanskrit):\nA\n\nTransliteration (Malayalam):\nB\n\nMalayalam Meaning:\nC\n\nEnglish Meaning:\n\u{201c}D\u{201d}\n\n\u{2014} The Ramayana"
        );
        assert!(!text.contains("sunset"));
    }

    #[test]
    fn test_clipboard_text_keeps_field_whitespace() {
        let mut content = sample_content("");
        content.verse_text = "\n  first line\n  second line  ".to_string();
        content.secondary_translation = " D ".to_string();

        let text = content.clipboard_text();
        assert!(text.starts_with("Sloka (Sanskrit):\n\n  first line\n  second line  \n\n"));
        assert!(text.contains("\u{201c} D \u{201d}"));
        assert!(text.ends_with("\u{2014} The Ramayana"));
    }

    #[test]
    fn test_post_content_wire_names() {
        let value = serde_json::to_value(sample_content("")).unwrap();
        assert_eq!(value["sanskrit_sloka"], "A");
        assert_eq!(value["malayalam_transliteration"], "B");
        assert_eq!(value["malayalam_meaning"], "C");
        assert_eq!(value["english_meaning"], "D");
        assert_eq!(value["visual_prompt"], "sunset");
    }

    #[test]
    fn test_blank_field_is_rejected() {
        let err = PostContent::from_json(
            r#"{"sanskrit_sloka":"A","malayalam_transliteration":"  ","malayalam_meaning":"C","english_meaning":"D","visual_prompt":"E"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            GenerationError::SchemaValidation("field 'malayalam_transliteration' is empty".to_string())
        );
    }

    #[test]
    fn test_non_object_answer_is_rejected() {
        assert!(matches!(
            PostContent::from_json("[1, 2, 3]"),
            Err(GenerationError::SchemaValidation(_))
        ));
        assert!(matches!(
            PostContent::from_json("not json"),
            Err(GenerationError::SchemaValidation(_))
        ));
    }

    #[test]
    fn test_displayable_post_wire_shape() {
        let post = DisplayablePost::new(sample_content(""), true);
        let value = serde_json::to_value(&post).unwrap();
        assert_eq!(value["sanskrit_sloka"], "A");
        assert_eq!(value["imageUrl"], serde_json::Value::Null);
        assert_eq!(value["imageRequested"], true);
    }

    #[test]
    fn test_state_serializes_with_status_tag() {
        let snapshot = StateSnapshot {
            token: 3,
            state: OrchestratorState::Error {
                message: "Post generation failed: boom".to_string(),
            },
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["token"], 3);
        assert_eq!(value["state"]["status"], "error");
        assert_eq!(value["state"]["message"], "Post generation failed: boom");

        let generating = serde_json::to_value(OrchestratorState::Generating {
            phase: GenerationPhase::Image,
            post: None,
        })
        .unwrap();
        assert_eq!(generating["status"], "generating");
        assert_eq!(generating["phase"], "image");
    }

    #[test]
    fn test_generate_options_default_to_image() {
        let options: GenerateOptions = serde_json::from_str("{}").unwrap();
        assert!(options.include_image);
        let options: GenerateOptions = serde_json::from_str(r#"{"includeImage":false}"#).unwrap();
        assert!(!options.include_image);
    }
}
