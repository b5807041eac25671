use anyhow::Context;
use api::{build_app, AppState};
use config::{LoggingConfig, MockServerConfig};
use services::{ConfigWatcher, TokenizerRegistry};
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Load configuration first to get logging settings
    let config = MockServerConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Application cannot start without a valid configuration.");
        std::process::exit(1);
    });

    init_tracing(&config.logging);

    if let Err(e) = run(config).await {
        tracing::error!(error = %format!("{e:#}"), "Server stopped with a fatal error");
        std::process::exit(1);
    }
}

async fn run(config: MockServerConfig) -> anyhow::Result<()> {
    let tokenizers = TokenizerRegistry::from_config(&config.dialects);

    let (watcher, snapshots) = ConfigWatcher::load(
        &config.responses.path,
        Duration::from_millis(config.responses.poll_interval_ms),
    )
    .context("Application cannot start without a valid responses document")?;
    let watcher = watcher.spawn();

    let app_state =
        AppState::new(snapshots, tokenizers, &config.dialects).with_reload(watcher.trigger());
    let app = build_app(app_state);

    let bind_address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    tracing::info!(address = %bind_address, responses = %config.responses.path, "Server started successfully");
    tracing::info!("API Endpoints:");
    tracing::info!("  - POST /v1/chat/completions (OpenAI Chat Completions)");
    tracing::info!("  - POST /v1/messages (Anthropic Messages)");
    tracing::info!("  - GET  /health");
    tracing::info!("  - GET  /mock/responses");
    tracing::info!("  - POST /mock/reload");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    watcher.shutdown().await;
    tracing::info!("Server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

fn init_tracing(logging_config: &LoggingConfig) {
    let filter = logging_config.filter_directive();

    // Initialize tracing based on the format specified in config
    match logging_config.format.as_str() {
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
    }
}
