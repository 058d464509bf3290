mod audio;
mod config;
mod error;
mod models;
mod openai;
mod pdf;
mod prompts;
mod provider;
mod routes;
#[cfg(test)]
mod testing;
mod workflow;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{config::AppConfig, openai::OpenAiClient, provider::Services, routes::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    tracing::info!(api_base = %config.api_base, text_model = %config.settings.text_model, image_model = %config.settings.image_model, "Provider configured");

    let client = Arc::new(OpenAiClient::new(config.api_key.clone(), &config.api_base));
    let state = AppState::new(Services::from_client(client, config.settings.clone()));

    let app = routes::router(state).layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
