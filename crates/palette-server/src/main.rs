mod configuration;
mod error;
mod routes;
mod state;

use anyhow::Context;
use palette::{chat::ChatBridge, providers::anthropic::AnthropicProvider};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up ANTHROPIC_API_KEY and friends from a local .env file
    dotenv::dotenv().ok();

    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let settings = configuration::Settings::new()?;
    let addr = settings
        .server
        .socket_addr()
        .context("Invalid server host or port")?;

    let system = settings.provider.system.clone();
    let provider_config = settings.provider.into_config();
    info!(model = %provider_config.model, "using anthropic provider");
    let provider = AnthropicProvider::new(provider_config)?;

    // Create app state
    let state = state::AppState::new(ChatBridge::new(Arc::new(provider)).with_system(system));

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    // Run server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
