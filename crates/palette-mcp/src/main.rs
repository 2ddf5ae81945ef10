use palette::systems::ImageSystem;
use palette_mcp::configuration::Settings;
use palette_mcp::transport::line_guard;
use palette_mcp::McpServer;
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::new()?;
    let generator = settings.generator.build()?;
    info!(generator = %generator.describe(), "image generator ready");

    let server = McpServer::new(Arc::new(ImageSystem::new(generator)));
    let (io, output) = line_guard(tokio::io::stdin(), tokio::io::stdout());
    let service = server.serve(io).await?;
    info!("mcp server ready");

    let reason = service.waiting().await?;
    info!(?reason, "input closed, shutting down");
    output.drain().await;
    Ok(())
}
