use config::{Config, Environment};
use palette::imaging::{
    GradioConfig, GradioImageGenerator, ImageGenerator, InferenceParams, MockImageGenerator,
};
use palette::imaging::gradio::{GRADIO_API_NAME, GRADIO_API_PREFIX, GRADIO_HOST};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Read when `PALETTE_MCP_GENERATOR__HF_TOKEN` is not set
pub const HF_TOKEN_ENV_VAR: &str = "HF_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a generator field to the environment variable that sets it
pub fn to_env_var(field: &str) -> String {
    let path = if field.contains('.') {
        field.to_string()
    } else {
        format!("generator.{}", field)
    };
    format!("PALETTE_MCP_{}", path.replace('.', "__").to_uppercase())
}

/// Which image backend answers `generate_image`, picked with `PALETTE_MCP_GENERATOR__TYPE`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeneratorSettings {
    Gradio {
        #[serde(default = "default_gradio_host")]
        host: String,
        #[serde(default = "default_api_prefix")]
        api_prefix: String,
        #[serde(default = "default_api_name")]
        api_name: String,
        #[serde(default)]
        hf_token: Option<String>,
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
        #[serde(default = "default_model_size")]
        model_size: String,
        #[serde(default = "default_guidance_scale")]
        guidance_scale: f32,
        #[serde(default = "default_steps")]
        num_inference_steps: u32,
        #[serde(default = "default_randomize_seed")]
        randomize_seed: bool,
        #[serde(default)]
        seed: u64,
    },
    /// Serve canned images from a directory, for offline use
    Mock { dir: PathBuf },
}

impl GeneratorSettings {
    pub fn build(self) -> anyhow::Result<Arc<dyn ImageGenerator>> {
        match self {
            GeneratorSettings::Gradio {
                host,
                api_prefix,
                api_name,
                hf_token,
                width,
                height,
                model_size,
                guidance_scale,
                num_inference_steps,
                randomize_seed,
                seed,
            } => {
                let config = GradioConfig {
                    host,
                    api_prefix,
                    api_name,
                    hf_token: hf_token.filter(|token| !token.is_empty()),
                    params: InferenceParams {
                        width,
                        height,
                        model_size,
                        guidance_scale,
                        num_inference_steps,
                        randomize_seed,
                        seed,
                    },
                };
                Ok(Arc::new(GradioImageGenerator::new(config)?))
            }
            GeneratorSettings::Mock { dir } => Ok(Arc::new(MockImageGenerator::new(dir))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub generator: GeneratorSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut builder = Config::builder().set_default("generator.type", "gradio")?;

        if let Ok(token) = std::env::var(HF_TOKEN_ENV_VAR) {
            builder = builder.set_default("generator.hf_token", token)?;
        }

        let config = builder
            .add_source(
                Environment::with_prefix("PALETTE_MCP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            let message = err.to_string();
            match message.strip_prefix("missing field `") {
                Some(rest) => ConfigError::MissingEnvVar {
                    env_var: to_env_var(rest.split('`').next().unwrap_or_default()),
                },
                None => ConfigError::Other(err),
            }
        })
    }
}

fn default_gradio_host() -> String {
    GRADIO_HOST.to_string()
}

fn default_api_prefix() -> String {
    GRADIO_API_PREFIX.to_string()
}

fn default_api_name() -> String {
    GRADIO_API_NAME.to_string()
}

fn default_width() -> u32 {
    InferenceParams::default().width
}

fn default_height() -> u32 {
    InferenceParams::default().height
}

fn default_model_size() -> String {
    InferenceParams::default().model_size
}

fn default_guidance_scale() -> f32 {
    InferenceParams::default().guidance_scale
}

fn default_steps() -> u32 {
    InferenceParams::default().num_inference_steps
}

fn default_randomize_seed() -> bool {
    InferenceParams::default().randomize_seed
}
