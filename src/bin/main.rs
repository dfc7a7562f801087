//! Process entrypoint for the ensemble reasoning gateway.
//!
//! Loads configuration, wires up the shared `reqwest::Client` / `ModelClient`
//! / `Orchestrator` for the process lifetime (spec §5), and serves the
//! OpenAI-compatible HTTP surface (spec §6).

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use gateway_core::config::Config;
use gateway_core::model_client::HttpModelClient;
use gateway_core::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(name = "ensemble-gateway", about = "OpenAI-compatible ensemble reasoning gateway")]
struct Args {
    /// Path to the YAML configuration document.
    #[arg(long, env = "GATEWAY_CONFIG", default_value = "gateway.yaml")]
    config: String,

    /// Emit structured JSON logs instead of human-readable text.
    #[arg(long, env = "GATEWAY_LOG_JSON", default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    gateway_core::logging::init(args.log_json);

    let config = match Config::load_from_path(&args.config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(error = %e, path = %args.config, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let bind: SocketAddr = match config.server.bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, bind = %config.server.bind, "invalid server.bind address");
            return ExitCode::FAILURE;
        }
    };

    let http = reqwest::Client::builder()
        .build()
        .expect("reqwest client construction should never fail with default TLS settings");
    let client = Arc::new(HttpModelClient::new(http, config.upstream.clone()));

    let state = AppState::new(config, client);
    let app = server::router(state);

    let listener = match tokio::net::TcpListener::bind(bind).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %bind, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%bind, "ensemble-gateway listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}
