//! Code Canvas CLI
//!
//! Boots the Code Canvas server: loads configuration and the stored API key,
//! optionally preloads a source file, and serves the HTTP API until Ctrl+C.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use canvas_genai::{GeminiClient, SharedClient};
use canvas_orchestrator::{
    create_router, spawn_vibe_reactor, AppState, CanvasService, Config, SourceText,
};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Code Canvas - Visual code analysis server
///
/// Turns source code into an architecture diagram, a complexity score,
/// a learning path with quizzes and generated artwork.
#[derive(Parser, Debug)]
#[command(name = "code-canvas")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: canvas.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Source file to load at startup
    #[arg(short, long, value_name = "FILE")]
    file: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Port for the HTTP API server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Code Canvas starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run_server(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads everything the session needs and serves it until Ctrl+C.
async fn run_server(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    print_config(&config);

    let client: SharedClient = Arc::new(
        GeminiClient::new(&config.api_base_url, config.request_timeout())
            .map_err(|e| anyhow::anyhow!("{e}"))?,
    );
    let service = Arc::new(CanvasService::from_config(&config, client));

    if service
        .load_stored_credential()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?
    {
        println!("  API key: loaded from {}", config.credentials_file);
    } else {
        println!("  API key: not set (save one in Settings)");
    }

    // Subscribed before the preload so the first vibe is generated for it.
    let _reactor = spawn_vibe_reactor(Arc::clone(&service));

    if let Some(ref file) = args.file {
        preload_source(&service, Path::new(file)).await?;
    }

    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();
    let router = create_router(AppState::with_service(config, service));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("Code Canvas running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Code Canvas stopped");
    Ok(())
}

/// Loads configuration from the specified path or the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads `path` through the upload allow-list and makes it the session source.
async fn preload_source(service: &CanvasService, path: &Path) -> anyhow::Result<()> {
    let source = SourceText::load(path).map_err(|e| anyhow::anyhow!("{e}"))?;
    let lines = source.line_count();
    service.set_source(source).await;
    println!("  Source: {} ({lines} lines)", path.display());
    Ok(())
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Analysis model: {}", config.analysis_model);
    println!("  Vibe model: {}", config.vibe_model);
    println!("  User level: {}", config.user_level);
    println!("  Request timeout: {}s", config.request_timeout_secs);
    if config.renderer.enabled {
        println!("  Diagram renderer: {}", config.renderer.command);
    } else {
        println!("  Diagram renderer: disabled");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    println!();
    println!("Shutting down...");
}
