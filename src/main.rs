use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use slokapost::{
    Config, create_app, data_uri,
    post::{GenerateOptions, OrchestratorState, PostGenerator},
    provider::{
        ProviderKind, Providers,
        providers::{api_client::ApiClient, gemini::GeminiProvider, null::NullProvider},
    },
    startup_checks,
    watermark::Watermarker,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Global options that apply to all commands
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server (default if no command specified)
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Automatically quit after specified number of seconds (useful for testing)
        #[arg(long)]
        quit_after: Option<u64>,
    },

    /// Generate one post and print it
    Generate {
        /// Skip the image step
        #[arg(long)]
        text_only: bool,

        /// Use a running server instead of calling the provider directly
        #[arg(long, conflicts_with = "api_key")]
        server: Option<String>,

        /// Your own provider API key (falls back to the configured environment variable)
        #[arg(long)]
        api_key: Option<String>,

        /// Where to write the watermarked image
        #[arg(short, long, default_value = slokapost::api::DOWNLOAD_FILENAME)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set up logging first
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Generate {
            text_only,
            server,
            api_key,
            output,
        }) => run_generate(config, text_only, server, api_key, output).await,
        Some(Commands::Serve {
            port,
            host,
            quit_after,
        }) => run_server(config, port, host, quit_after).await,
        None => {
            // Default to serve command if no subcommand specified
            run_server(config, None, None, None).await
        }
    }
}

fn load_config(config_path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if config_path.exists() {
        let config_content = std::fs::read_to_string(config_path)?;
        let config = toml_edit::de::from_str::<Config>(&config_content)?;
        info!("Configuration loaded from: {:?}", config_path);
        Ok(config)
    } else {
        info!("Config file not found at {:?}, using defaults", config_path);
        Ok(Config::default())
    }
}

async fn run_generate(
    config: Config,
    text_only: bool,
    server: Option<String>,
    api_key: Option<String>,
    output: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(config.provider.request_timeout_secs);

    let providers = if let Some(server) = server {
        info!("Generating through server at {}", server);
        Providers::from_shared(Arc::new(ApiClient::new(server, timeout)?))
    } else if let Some(api_key) = api_key.or_else(|| config.provider.api_key_from_env()) {
        Providers::from_shared(Arc::new(GeminiProvider::new(
            api_key,
            &config.provider,
            &config.prompts,
        )?))
    } else if config.provider.kind == ProviderKind::Null {
        Providers::from_shared(Arc::new(NullProvider::new()))
    } else {
        return Err(format!(
            "No API key: pass --api-key, set {}, or use --server",
            config.provider.api_key_env
        )
        .into());
    };

    let generator = PostGenerator::new(
        providers,
        Watermarker::from_config(&config.watermark)?,
        config.watermark.text.clone(),
    );

    let mut updates = generator.subscribe();
    let progress = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let label = updates.borrow_and_update().state.status_label();
            info!("{}", label);
        }
    });

    generator
        .generate_post(GenerateOptions {
            include_image: !text_only,
        })
        .await;
    let state = generator.state();
    drop(generator);
    let _ = progress.await;

    match state {
        OrchestratorState::Done { post } => {
            println!("{}", post.content.clipboard_text());
            if let Some(image_url) = &post.image_url {
                let image = data_uri::decode(image_url)?;
                tokio::fs::write(&output, &image.bytes).await?;
                println!("\nImage saved to {}", output.display());
            }
            Ok(())
        }
        OrchestratorState::Error { message } => Err(message.into()),
        other => Err(format!("Generation ended in unexpected state: {:?}", other).into()),
    }
}

async fn run_server(
    config: Config,
    port: Option<u16>,
    host: Option<String>,
    quit_after: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = host.unwrap_or(config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    info!("Starting {} server", config.app.name);
    info!("Watermark font: {:?}", config.watermark.font_path);

    // Perform startup checks
    match startup_checks::perform_startup_checks(&config).await {
        Ok(()) => info!("All startup checks passed"),
        Err(errors) => {
            for error in &errors {
                tracing::error!("Startup check failed: {}", error);
            }
            if errors.iter().any(startup_checks::StartupCheckError::is_critical) {
                tracing::error!("Critical startup check failed, exiting");
                return Err("Critical startup check failed".into());
            } else {
                tracing::warn!("Non-critical startup checks failed, continuing");
            }
        }
    }

    let app = create_app(config).await?;

    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Set up graceful shutdown
    let server = axum::serve(listener, app);
    let graceful = server.with_graceful_shutdown(shutdown_signal(quit_after));

    if let Err(e) = graceful.await {
        tracing::error!("Server error: {}", e);
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(quit_after: Option<u64>) {
    use tokio::signal;
    use tokio::time::sleep;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let quit_timer = async {
        if let Some(seconds) = quit_after {
            info!(
                "Server will automatically shut down after {} seconds",
                seconds
            );
            sleep(Duration::from_secs(seconds)).await;
            info!("Quit timer expired, shutting down");
        } else {
            std::future::pending::<()>().await
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        },
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        },
        _ = quit_timer => {},
    }
}
