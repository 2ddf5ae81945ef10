use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{mime_type_for, GeneratedImage, ImageGenerator};
use crate::providers::utils::handle_response_status;

pub const GRADIO_HOST: &str = "https://ysharma-sanasprint.hf.space";
pub const GRADIO_API_PREFIX: &str = "/gradio_api";
pub const GRADIO_API_NAME: &str = "/infer";

/// Inputs of the SanaSprint `/infer` endpoint other than the prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    pub width: u32,
    pub height: u32,
    pub model_size: String,
    pub guidance_scale: f32,
    pub num_inference_steps: u32,
    pub randomize_seed: bool,
    pub seed: u64,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            model_size: "1.6B".to_string(),
            guidance_scale: 4.5,
            num_inference_steps: 2,
            randomize_seed: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GradioConfig {
    /// Root of the Gradio app, e.g. a Hugging Face space
    pub host: String,
    /// Path prefix of the HTTP API, `/gradio_api` for Gradio 5
    pub api_prefix: String,
    pub api_name: String,
    /// Hugging Face token, needed for private spaces and to lift anonymous quotas
    pub hf_token: Option<String>,
    pub params: InferenceParams,
}

impl Default for GradioConfig {
    fn default() -> Self {
        Self {
            host: GRADIO_HOST.to_string(),
            api_prefix: GRADIO_API_PREFIX.to_string(),
            api_name: GRADIO_API_NAME.to_string(),
            hf_token: None,
            params: InferenceParams::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    event_id: String,
}

/// Client for a Gradio text-to-image endpoint, driven through the queue based HTTP API:
/// submit the inputs, wait on the event stream for the outputs, then download the file.
pub struct GradioImageGenerator {
    client: Client,
    config: GradioConfig,
}

impl GradioImageGenerator {
    pub fn new(config: GradioConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> String {
        format!(
            "{}{}",
            self.config.host.trim_end_matches('/'),
            self.config.api_prefix.trim_end_matches('/')
        )
    }

    fn call_url(&self) -> String {
        format!("{}/call/{}", self.base_url(), self.config.api_name.trim_start_matches('/'))
    }

    fn file_url(&self, path: &str) -> String {
        format!("{}/file={}", self.base_url(), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.hf_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn inputs(&self, prompt: &str) -> Value {
        let params = &self.config.params;
        json!({
            "data": [
                prompt,
                params.model_size,
                params.seed,
                params.randomize_seed,
                params.width,
                params.height,
                params.guidance_scale,
                params.num_inference_steps,
            ]
        })
    }

    async fn submit(&self, prompt: &str) -> Result<String> {
        let response = self
            .authorize(self.client.post(self.call_url()))
            .json(&self.inputs(prompt))
            .send()
            .await?;

        let submitted: SubmitResponse = handle_response_status(response)
            .await?
            .json()
            .await
            .context("Invalid submit response from image API")?;
        Ok(submitted.event_id)
    }

    /// Follow the event stream of a submitted job until its outputs arrive
    async fn await_outputs(&self, event_id: &str) -> Result<Value> {
        let url = format!("{}/{}", self.call_url(), event_id);
        let response = self.authorize(self.client.get(url)).send().await?;
        let mut events = handle_response_status(response)
            .await?
            .bytes_stream()
            .eventsource();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| anyhow!("SSE error: {}", e))?;
            tracing::trace!(event = %event.event, data = %event.data, "gradio event");

            match event.event.as_str() {
                "complete" => {
                    return serde_json::from_str(&event.data)
                        .context("Invalid output from image API");
                }
                "error" => {
                    let message = match serde_json::from_str::<Value>(&event.data) {
                        Ok(Value::String(message)) => message,
                        _ if event.data.trim().is_empty() || event.data.trim() == "null" => {
                            "the image API reported an error".to_string()
                        }
                        _ => event.data.clone(),
                    };
                    return Err(anyhow!(message));
                }
                _ => {}
            }
        }

        Err(anyhow!("event stream closed before the image was generated"))
    }

    /// Pull the image location and the seed out of the `[image, seed]` output pair
    fn parse_outputs(&self, outputs: &Value) -> Result<(String, String, Option<u64>)> {
        let image = outputs
            .get(0)
            .ok_or_else(|| anyhow!("Image API returned no outputs"))?;
        let seed = outputs.get(1).and_then(Value::as_u64);

        let (path, url) = match image {
            Value::String(path) => (path.clone(), None),
            Value::Object(file) => {
                let path = file.get("path").and_then(Value::as_str);
                let url = file.get("url").and_then(Value::as_str);
                match (path, url) {
                    (Some(path), url) => (path.to_string(), url.map(String::from)),
                    (None, Some(url)) => (url.to_string(), Some(url.to_string())),
                    (None, None) => return Err(anyhow!("Image output has no path or url")),
                }
            }
            other => return Err(anyhow!("Unexpected image output: {}", other)),
        };

        let url = match url {
            Some(url) => url,
            None if path.starts_with("http://") || path.starts_with("https://") => path.clone(),
            None => self.file_url(&path),
        };
        Ok((path, url, seed))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.authorize(self.client.get(url)).send().await?;
        let bytes = handle_response_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageGenerator for GradioImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage> {
        let event_id = self.submit(prompt).await?;
        tracing::debug!(%event_id, "image job submitted");

        let outputs = self.await_outputs(&event_id).await?;
        let (path, url, seed) = self.parse_outputs(&outputs)?;
        let data = self.download(&url).await?;

        Ok(GeneratedImage {
            mime_type: mime_type_for(&path),
            reference: url,
            data,
            seed,
        })
    }

    fn describe(&self) -> String {
        let params = &self.config.params;
        format!(
            "size: {}x{} pixels, model: {}",
            params.width, params.height, params.model_size
        )
    }
}
