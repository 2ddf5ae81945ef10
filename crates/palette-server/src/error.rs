use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a settings field to the environment variable that sets it
///
/// Bare field names come from serde's missing field errors, which only know the leaf name;
/// the provider section is the only one with required fields.
pub fn to_env_var(field_path: &str) -> String {
    let normalized_path = if field_path.contains('.') {
        field_path.to_string()
    } else {
        format!("provider.{}", field_path)
    };
    format!("PALETTE_{}", normalized_path.replace('.', "__").to_uppercase())
}
