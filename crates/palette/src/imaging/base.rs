use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use url::Url;

/// An image produced by a generator
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Where the image can be fetched again: a URL or a local path
    pub reference: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    /// Seed reported by the generator, when it reports one
    pub seed: Option<u64>,
}

impl GeneratedImage {
    pub fn data_base64(&self) -> String {
        BASE64.encode(&self.data)
    }
}

/// A remote or local source of generated images
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image for the prompt
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage>;

    /// Short human readable description of the generation settings
    fn describe(&self) -> String;
}

/// Guess the MIME type of an image from the extension of its path or URL
///
/// Anything without an extension is assumed to be a JPEG.
pub fn mime_type_for(reference: &str) -> String {
    let path = match Url::parse(reference) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.path().to_string(),
        _ => reference
            .split(&['?', '#'][..])
            .next()
            .unwrap_or(reference)
            .to_string(),
    };
    let path = path.as_str();
    let file_name = path.rsplit('/').next().unwrap_or(path);

    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            match ext.to_lowercase().as_str() {
                "jpg" | "jpeg" => "image/jpeg".to_string(),
                other => format!("image/{}", other),
            }
        }
        _ => "image/jpeg".to_string(),
    }
}
