use anyhow::{anyhow, Result};
use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::{Event, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Display;
use std::time::Duration;

use super::base::{Provider, ProviderStream, StreamChunk, Usage};
use super::configs::{AnthropicProviderConfig, ANTHROPIC_MAX_TOKENS};
use super::utils::{handle_response_status, messages_to_anthropic_spec};
use crate::models::message::Message;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_payload(&self, system: &str, messages: &[Message]) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_anthropic_spec(messages),
            "max_tokens": self.config.max_tokens.unwrap_or(ANTHROPIC_MAX_TOKENS),
            "stream": true,
        });

        if !system.is_empty() {
            payload["system"] = json!(system);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }

        payload
    }

    async fn post(&self, payload: Value) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        handle_response_status(response).await
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn stream(&self, system: &str, messages: &[Message]) -> Result<ProviderStream> {
        let payload = self.build_payload(system, messages);
        tracing::debug!(model = %self.config.model, messages = messages.len(), "starting completion stream");

        let response = self.post(payload).await?;
        Ok(chunks_from_events(response.bytes_stream().eventsource()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    input_tokens: Option<i32>,
    output_tokens: Option<i32>,
}

impl ApiUsage {
    fn update(&mut self, other: ApiUsage) {
        if other.input_tokens.is_some() {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens.is_some() {
            self.output_tokens = other.output_tokens;
        }
    }

    fn into_usage(self) -> Usage {
        let total = match (self.input_tokens, self.output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Usage::new(self.input_tokens, self.output_tokens, total)
    }
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

fn parse_event<'a, T: Deserialize<'a>>(event: &'a Event) -> Option<T> {
    match serde_json::from_str(&event.data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(event = %event.event, "skipping undecodable event: {}", e);
            None
        }
    }
}

/// Turn the server-sent events of a messages stream into chunks
fn chunks_from_events<S, E>(events: S) -> ProviderStream
where
    S: Stream<Item = Result<Event, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(stream! {
        let mut events = Box::pin(events);
        let mut usage = ApiUsage::default();
        let mut terminated = false;

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield Err(anyhow!("SSE error: {}", e));
                    terminated = true;
                    break;
                }
            };
            tracing::trace!(event = %event.event, data = %event.data, "anthropic event");

            match event.event.as_str() {
                "message_start" => {
                    if let Some(start) = parse_event::<MessageStart>(&event) {
                        if let Some(start_usage) = start.message.usage {
                            usage.update(start_usage);
                        }
                    }
                }
                "content_block_delta" => {
                    if let Some(ContentBlockDelta { delta: Delta::TextDelta { text } }) =
                        parse_event(&event)
                    {
                        if !text.is_empty() {
                            yield Ok(StreamChunk::text(text));
                        }
                    }
                }
                "message_delta" => {
                    if let Some(MessageDelta { usage: Some(delta_usage) }) = parse_event(&event) {
                        usage.update(delta_usage);
                    }
                }
                "message_stop" => {
                    yield Ok(StreamChunk::finished(Some(std::mem::take(&mut usage).into_usage())));
                    terminated = true;
                    break;
                }
                "error" => {
                    let error = match parse_event::<ErrorEvent>(&event) {
                        Some(ErrorEvent { error }) => anyhow!("{}: {}", error.kind, error.message),
                        None => anyhow!("Upstream error: {}", event.data),
                    };
                    yield Err(error);
                    terminated = true;
                    break;
                }
                _ => {}
            }
        }

        if !terminated {
            yield Err(anyhow!("stream closed before response completed"));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse(events: &[(&str, Value)]) -> String {
        events
            .iter()
            .map(|(name, data)| format!("event: {}\ndata: {}\n\n", name, data))
            .collect()
    }

    fn text_delta(text: &str) -> (&'static str, Value) {
        (
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}}),
        )
    }

    async fn setup_mock_server(status: u16, body: String) -> (MockServer, AnthropicProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"stream": true, "max_tokens": 1000})))
            .respond_with(ResponseTemplate::new(status).set_body_raw(body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let config = AnthropicProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
            model: "claude-3-7-sonnet-20250219".to_string(),
            temperature: None,
            max_tokens: None,
        };

        let provider = AnthropicProvider::new(config).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_stream_text_deltas() -> Result<()> {
        let body = sse(&[
            (
                "message_start",
                json!({"type": "message_start", "message": {"id": "msg_123", "usage": {"input_tokens": 12, "output_tokens": 1}}}),
            ),
            ("ping", json!({"type": "ping"})),
            text_delta("Hello"),
            text_delta(", world"),
            (
                "message_delta",
                json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 15}}),
            ),
            ("message_stop", json!({"type": "message_stop"})),
        ]);
        let (_server, provider) = setup_mock_server(200, body).await;

        let messages = vec![Message::user().with_text("Hello?")];
        let chunks: Vec<StreamChunk> = provider
            .stream("You are a helpful assistant.", &messages)
            .await?
            .try_collect()
            .await?;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "Hello");
        assert_eq!(chunks[1].text, ", world");
        assert!(chunks[2].is_final);
        assert_eq!(
            chunks[2].usage,
            Some(Usage::new(Some(12), Some(15), Some(27)))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_error_event_ends_stream() -> Result<()> {
        let body = sse(&[
            text_delta("partial"),
            (
                "error",
                json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
            ),
            text_delta("never seen"),
        ]);
        let (_server, provider) = setup_mock_server(200, body).await;

        let items: Vec<Result<StreamChunk>> = provider
            .stream("", &[Message::user().with_text("hi")])
            .await?
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().text, "partial");
        let error = items[1].as_ref().unwrap_err().to_string();
        assert_eq!(error, "overloaded_error: Overloaded");
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() -> Result<()> {
        let body = sse(&[text_delta("cut")]);
        let (_server, provider) = setup_mock_server(200, body).await;

        let items: Vec<Result<StreamChunk>> = provider
            .stream("", &[Message::user().with_text("hi")])
            .await?
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert!(items[1]
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("stream closed before response completed"));
        Ok(())
    }

    #[tokio::test]
    async fn test_request_failure_status() {
        let (_server, provider) =
            setup_mock_server(400, r#"{"error": "bad request"}"#.to_string()).await;

        let result = provider.stream("", &[Message::user().with_text("hi")]).await;
        let error = result.err().unwrap().to_string();
        assert!(error.starts_with("Request failed: 400"), "{}", error);
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let (_server, provider) = setup_mock_server(529, String::new()).await;

        let result = provider.stream("", &[Message::user().with_text("hi")]).await;
        assert!(result.err().unwrap().to_string().starts_with("Server error"));
    }

    #[test]
    fn test_payload_includes_system_and_temperature() {
        let mut config = AnthropicProviderConfig::new("key");
        config.temperature = Some(0.5);
        let provider = AnthropicProvider::new(config).unwrap();

        let payload = provider.build_payload("be brief", &[Message::user().with_text("hi")]);
        assert_eq!(payload["system"], "be brief");
        assert_eq!(payload["temperature"], 0.5);
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["model"], provider.model());

        let payload = AnthropicProvider::new(AnthropicProviderConfig::new("key"))
            .unwrap()
            .build_payload("", &[]);
        assert!(payload.get("system").is_none());
        assert!(payload.get("temperature").is_none());
    }
}
