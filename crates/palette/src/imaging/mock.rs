use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::base::{mime_type_for, GeneratedImage, ImageGenerator};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

/// Serves images from a local directory instead of calling a remote API
///
/// Files are handed out round robin in name order, whatever the prompt.
pub struct MockImageGenerator {
    dir: PathBuf,
    next: AtomicUsize,
}

impl MockImageGenerator {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            next: AtomicUsize::new(0),
        }
    }

    async fn list_images(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Cannot read mock images from {}", self.dir.display()))?;

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Follows symlinks, so a linked image counts
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if is_file && is_image(&path) {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage> {
        let images = self.list_images().await?;
        if images.is_empty() {
            return Err(anyhow!("No mock images found in {}", self.dir.display()));
        }

        let index = self.next.fetch_add(1, Ordering::SeqCst) % images.len();
        let path = &images[index];
        tracing::debug!(prompt, path = %path.display(), "serving mock image");

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let reference = path.display().to_string();

        Ok(GeneratedImage {
            mime_type: mime_type_for(&reference),
            reference,
            data,
            seed: None,
        })
    }

    fn describe(&self) -> String {
        format!("mock images from {}", self.dir.display())
    }
}
