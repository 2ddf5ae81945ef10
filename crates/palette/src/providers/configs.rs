pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";
pub const ANTHROPIC_MODEL: &str = "claude-3-7-sonnet-20250219";
pub const ANTHROPIC_MAX_TOKENS: i32 = 1000;

#[derive(Debug, Clone)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl AnthropicProviderConfig {
    /// Config against the public API with the default model
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: ANTHROPIC_HOST.to_string(),
            api_key: api_key.into(),
            model: ANTHROPIC_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}
