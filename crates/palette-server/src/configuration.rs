use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use palette::providers::configs::{
    AnthropicProviderConfig, ANTHROPIC_HOST, ANTHROPIC_MAX_TOKENS, ANTHROPIC_MODEL,
};
use serde::Deserialize;
use std::net::SocketAddr;

/// Read when `PALETTE_PROVIDER__API_KEY` is not set
pub const API_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_anthropic_host")]
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i32,
    /// System prompt sent with every request
    #[serde(default)]
    pub system: String,
}

impl ProviderSettings {
    // Convert to the palette provider config
    pub fn into_config(self) -> AnthropicProviderConfig {
        AnthropicProviderConfig {
            host: self.host,
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let mut builder = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults
            .set_default("provider.host", default_anthropic_host())?
            .set_default("provider.model", default_model())?
            .set_default("provider.max_tokens", default_max_tokens())?;

        // The conventional variable is only a fallback for the prefixed one
        if let Ok(api_key) = std::env::var(API_KEY_ENV_VAR) {
            builder = builder.set_default("provider.api_key", api_key)?;
        }

        let config = builder
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("PALETTE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Try to deserialize the configuration
        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `api_key`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .split('`')
                        .next()
                        .unwrap_or_default();
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    ANTHROPIC_MODEL.to_string()
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_max_tokens() -> i32 {
    ANTHROPIC_MAX_TOKENS
}
