use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use super::system::System;
use crate::errors::{ToolError, ToolResult};
use crate::imaging::ImageGenerator;
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

pub const GENERATE_IMAGE: &str = "generate_image";

/// Offers text-to-image generation as a single `generate_image` tool
pub struct ImageSystem {
    tools: Vec<Tool>,
    generator: Arc<dyn ImageGenerator>,
}

impl ImageSystem {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        let generate_image_tool = Tool::new(
            GENERATE_IMAGE,
            "Generate an image from a text prompt. Returns a short report, the generated image \
            and a reference to where the image can be fetched again.",
            json!({
                "type": "object",
                "required": ["prompt"],
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Text describing the image to generate."
                    }
                }
            }),
        );

        Self {
            tools: vec![generate_image_tool],
            generator,
        }
    }

    fn validate_prompt(params: &Value) -> ToolResult<&str> {
        let prompt = params
            .get("prompt")
            .ok_or_else(|| ToolError::InvalidParameters("prompt parameter required".into()))?
            .as_str()
            .ok_or_else(|| ToolError::InvalidParameters("prompt must be a string".into()))?;

        if prompt.trim().is_empty() {
            return Err(ToolError::InvalidParameters(
                "prompt must not be empty".into(),
            ));
        }
        Ok(prompt)
    }

    async fn generate_image(&self, params: Value) -> ToolResult<Vec<Content>> {
        tracing::debug!("validating generate_image request");
        let prompt = Self::validate_prompt(&params)?;

        let summary = format!(
            "Image generation request for '{}'. {}",
            prompt,
            self.generator.describe()
        );

        tracing::info!(prompt, "invoking image generator");
        let started = Instant::now();
        match self.generator.generate(prompt).await {
            Ok(image) => {
                let elapsed = started.elapsed().as_secs_f64();
                tracing::info!(reference = %image.reference, elapsed, "image generated");
                Ok(vec![
                    Content::text(format!(
                        "{}\nGeneration complete in {:.2}s\nImage: {}",
                        summary, elapsed, image.reference
                    )),
                    Content::image(image.data_base64(), image.mime_type),
                ])
            }
            Err(e) => {
                tracing::warn!("image generation failed: {:#}", e);
                Err(ToolError::ExecutionError(format!(
                    "{}\nGeneration failed: {}",
                    summary, e
                )))
            }
        }
    }
}

#[async_trait]
impl System for ImageSystem {
    fn name(&self) -> &str {
        "image"
    }

    fn description(&self) -> &str {
        "Text-to-image generation backed by a hosted model"
    }

    fn instructions(&self) -> &str {
        "Use the generate_image tool with a descriptive prompt to create an image."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> ToolResult<Vec<Content>> {
        tracing::debug!(tool = %tool_call.name, "tool call received");
        match tool_call.name.as_str() {
            GENERATE_IMAGE => self.generate_image(tool_call.arguments).await,
            _ => Err(ToolError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::GeneratedImage;
    use anyhow::{anyhow, Result};
    use std::sync::Mutex;

    /// Records prompts and answers with a fixed image, or fails when built with an error
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        failure: Option<String>,
    }

    impl RecordingGenerator {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                failure: None,
            })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                failure: Some(reason.to_string()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageGenerator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<GeneratedImage> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.failure {
                Some(reason) => Err(anyhow!(reason.clone())),
                None => Ok(GeneratedImage {
                    reference: "https://images.example/fox.png".into(),
                    mime_type: "image/png".into(),
                    data: b"hi".to_vec(),
                    seed: Some(7),
                }),
            }
        }

        fn describe(&self) -> String {
            "size: 256x256 pixels, model: test".into()
        }
    }

    #[tokio::test]
    async fn test_generate_image_success() {
        let generator = RecordingGenerator::ok();
        let system = ImageSystem::new(generator.clone());

        let result = system
            .call(ToolCall::new(
                GENERATE_IMAGE,
                json!({"prompt": "a red fox in snow"}),
            ))
            .await
            .unwrap();

        assert_eq!(generator.calls(), vec!["a red fox in snow"]);
        assert_eq!(result.len(), 2);
        let text = result[0].as_text().unwrap();
        assert!(text.starts_with("Image generation request for 'a red fox in snow'."));
        assert!(text.ends_with("Image: https://images.example/fox.png"));
        assert_eq!(result[1].as_image(), Some(("aGk=", "image/png")));
    }

    #[tokio::test]
    async fn test_empty_prompt_never_invokes_generator() {
        let generator = RecordingGenerator::ok();
        let system = ImageSystem::new(generator.clone());

        for arguments in [json!({"prompt": ""}), json!({"prompt": "  "}), json!({}), json!({"prompt": 3})] {
            let error = system
                .call(ToolCall::new(GENERATE_IMAGE, arguments))
                .await
                .unwrap_err();
            assert!(matches!(error, ToolError::InvalidParameters(_)));
        }
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_generator_failure_is_reported() {
        let system = ImageSystem::new(RecordingGenerator::failing("quota exceeded"));

        let error = system
            .call(ToolCall::new(GENERATE_IMAGE, json!({"prompt": "a cat"})))
            .await
            .unwrap_err();

        match error {
            ToolError::ExecutionError(message) => {
                assert!(message.contains("'a cat'"));
                assert!(message.ends_with("Generation failed: quota exceeded"));
            }
            other => panic!("Expected execution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let system = ImageSystem::new(RecordingGenerator::ok());

        let error = system
            .call(ToolCall::new("edit_image", json!({})))
            .await
            .unwrap_err();
        assert_eq!(error, ToolError::ToolNotFound("edit_image".into()));
    }

    #[test]
    fn test_tool_metadata() {
        let system = ImageSystem::new(RecordingGenerator::ok());
        let tools = system.tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "generate_image");
        assert_eq!(tools[0].input_schema["required"], json!(["prompt"]));
        assert_eq!(tools[0].input_schema["properties"]["prompt"]["type"], "string");
    }
}
