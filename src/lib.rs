use serde::{Deserialize, Serialize};

pub mod api;
pub mod data_uri;
pub mod post;
pub mod provider;
pub mod startup_checks;
pub mod watermark;

use provider::{PromptConfig, ProviderConfig};
use watermark::WatermarkConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            app: AppConfig {
                name: "Slokapost".to_string(),
            },
            watermark: WatermarkConfig::default(),
            provider: ProviderConfig::default(),
            prompts: PromptConfig::default(),
        }
    }
}

use ab_glyph::InvalidFont;
use axum::Router;
use post::PostGenerator;
use provider::Providers;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use watermark::Watermarker;

#[derive(Clone)]
pub struct AppState {
    /// `None` when the upstream credential is missing; generation requests
    /// then fail closed.
    pub providers: Option<Providers>,
    pub generator: Option<Arc<PostGenerator>>,
}

/// Fails only if no watermark font can be loaded at all.
pub async fn create_app(config: Config) -> Result<Router, InvalidFont> {
    let providers = match provider::create_providers(&config.provider, &config.prompts) {
        Ok(providers) => providers,
        Err(e) => {
            tracing::error!("Failed to set up generation providers: {}", e);
            None
        }
    };
    create_app_with_providers(config, providers)
}

/// Build the router around an explicit set of providers.
pub fn create_app_with_providers(
    config: Config,
    providers: Option<Providers>,
) -> Result<Router, InvalidFont> {
    let generator = match providers.clone() {
        Some(providers) => Some(Arc::new(PostGenerator::new(
            providers,
            Watermarker::from_config(&config.watermark)?,
            config.watermark.text,
        ))),
        None => None,
    };

    let app_state = AppState {
        providers,
        generator,
    };

    let router = Router::new()
        .route(
            "/api/generate-text",
            axum::routing::post(api::generate_text_handler),
        )
        .route(
            "/api/generate-image",
            axum::routing::post(api::generate_image_handler),
        )
        .route(
            "/api/post",
            axum::routing::get(api::post_state_handler).post(api::start_post_handler),
        )
        .route("/api/post/text", axum::routing::get(api::post_text_handler))
        .route(
            "/api/post/image",
            axum::routing::get(api::post_image_handler),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let method = request.method();
                    let uri = request.uri();
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %method,
                        uri = %uri,
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let headers = request.headers();
                    let user_agent = headers
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %request.method(),
                        path = %request.uri().path(),
                        user_agent = %user_agent,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let size = response
                            .headers()
                            .get("content-length")
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("-");

                        tracing::info!(
                            target: "access_log",
                            status = %response.status(),
                            size = %size,
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state);

    Ok(router)
}
