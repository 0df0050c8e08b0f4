mod config;
mod llm;
mod models;
mod parser;
mod pipeline;
mod prompts;
mod routes;
mod session;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::Config,
    llm::LlmClient,
    pipeline::Pipeline,
    routes::{router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!("External API URL configured: {}", config.llm.api_url.as_deref().unwrap_or("NOT SET"));
    tracing::info!("Default LLM Model: {}", config.llm.default_model);
    tracing::info!("External API Key: {}", config.llm.masked_key());
    tracing::info!("Question layout: {:?}", config.question_layout);
    match &config.session_dir {
        Some(dir) => tracing::info!("Session logs under {}", dir.display()),
        None => tracing::info!("Session logging disabled"),
    }

    let client = LlmClient::new(&config.llm).context("failed to build LLM client")?;
    if client.is_mock() {
        tracing::warn!("EXTERNAL_API_KEY not set: LLM calls will return mock data");
    }

    let state = AppState {
        pipeline: Arc::new(Pipeline::new(Arc::new(client), config.question_layout)),
        session_dir: config.session_dir.clone(),
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
