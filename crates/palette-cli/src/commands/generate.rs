use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cliclack::spinner;
use console::style;
use palette::models::content::Content;
use palette::systems::GENERATE_IMAGE;
use palette_mcp::McpClient;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub async fn run(prompt: &str, server: &str, output: &Path) -> Result<()> {
    let client = McpClient::spawn(server, &[], &HashMap::new(), "palette-cli").await?;
    if let Some(info) = client.server_info() {
        println!(
            "Connected to {} {}",
            info.server_info.name,
            style(&info.server_info.version).dim()
        );
    }

    println!("\nAvailable tools:");
    for tool in client.list_tools().await? {
        println!("- {}: {}", style(&tool.name).bold(), tool.description);
    }

    let spin = spinner();
    spin.start(format!("Generating image: '{}'", prompt));
    let result = client
        .call_tool(GENERATE_IMAGE, json!({ "prompt": prompt }))
        .await;
    spin.stop("");
    let result = result?;
    debug!(items = result.content.len(), is_error = result.is_error, "tool call finished");

    println!("Received {} items", result.content.len());
    for (i, content) in result.content.iter().enumerate() {
        match content {
            Content::Text(text) if result.is_error => println!("\n{}", style(&text.text).red()),
            Content::Text(text) => println!("\nText: {}", text.text),
            Content::Image(image) => {
                let path = save_image(output, i, &image.data, &image.mime_type)?;
                println!("\nImage saved: {}", path.display());
            }
        }
    }

    client.shutdown().await
}

/// Decode a base64 image item into `<dir>/generated_image_<index>.<ext>`
pub fn save_image(dir: &Path, index: usize, data: &str, mime_type: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create output directory {}", dir.display()))?;

    let bytes = STANDARD
        .decode(data)
        .context("Image data is not valid base64")?;
    let path = dir.join(format!(
        "generated_image_{}.{}",
        index,
        extension_for(mime_type)
    ));
    std::fs::write(&path, bytes).with_context(|| format!("Cannot write {}", path.display()))?;
    debug!(path = %path.display(), mime_type, "image saved");
    Ok(path)
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/webp"), "webp");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "jpg");
    }

    #[test]
    fn test_save_image_names_file_by_position() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("output");

        let path = save_image(&output, 1, "aGVsbG8=", "image/png").unwrap();

        assert_eq!(path, output.join("generated_image_1.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_save_image_rejects_bad_base64() {
        let dir = TempDir::new().unwrap();
        assert!(save_image(dir.path(), 0, "not base64!", "image/png").is_err());
    }
}
