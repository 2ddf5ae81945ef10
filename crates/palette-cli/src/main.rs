mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use palette::chat::ChatBridge;
use palette::providers::anthropic::AnthropicProvider;
use palette::providers::configs::{AnthropicProviderConfig, ANTHROPIC_MODEL};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with Claude in the terminal
    Chat {
        /// Anthropic API key
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Model to use
        #[arg(short, long, default_value = ANTHROPIC_MODEL)]
        model: String,

        /// System prompt sent with every message
        #[arg(long, default_value = "")]
        system: String,
    },

    /// Generate an image through the MCP tool server
    Generate {
        /// Text describing the image
        #[arg(short, long)]
        prompt: String,

        /// Command that starts the tool server
        #[arg(long, default_value = "palette-mcp")]
        server: String,

        /// Directory the images are written to
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Chat {
            api_key,
            model,
            system,
        } => {
            let config = AnthropicProviderConfig {
                model,
                ..AnthropicProviderConfig::new(api_key)
            };
            let provider = AnthropicProvider::new(config)?;
            let bridge = ChatBridge::new(Arc::new(provider)).with_system(system);
            commands::chat::run(bridge).await
        }
        Command::Generate {
            prompt,
            server,
            output,
        } => commands::generate::run(&prompt, &server, &output).await,
    }
}
