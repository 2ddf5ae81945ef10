use anyhow::{anyhow, Result};
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};

use crate::models::content::{Content, ImageContent};
use crate::models::message::Message;
use crate::models::role::Role;

/// Convert internal Message format to Anthropic's API message specification
///
/// Empty text is dropped since the API rejects empty text blocks, and so are
/// messages that end up with no content at all. Roles must alternate, so adjacent
/// messages from the same role are merged into one.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec: Vec<Value> = Vec::new();
    let mut last_role: Option<Role> = None;

    for message in messages {
        let mut blocks = Vec::new();
        for content in &message.content {
            match content {
                Content::Text(text) => {
                    if !text.text.is_empty() {
                        blocks.push(json!({
                            "type": "text",
                            "text": text.text,
                        }));
                    }
                }
                Content::Image(image) => blocks.push(convert_image(image)),
            }
        }

        if blocks.is_empty() {
            continue;
        }

        if last_role == Some(message.role) {
            if let Some(Value::Array(content)) = messages_spec
                .last_mut()
                .and_then(|previous| previous.get_mut("content"))
            {
                content.extend(blocks);
                continue;
            }
        }

        last_role = Some(message.role);
        messages_spec.push(json!({
            "role": message.role,
            "content": blocks,
        }));
    }

    messages_spec
}

/// Convert an image content into an anthropic image block
pub fn convert_image(image: &ImageContent) -> Value {
    json!({
        "type": "image",
        "source": {
            "type": "base64",
            "media_type": image.mime_type,
            "data": image.data,
        }
    })
}

/// Pass through successful responses, turn everything else into an error
pub async fn handle_response_status(response: Response) -> Result<Response> {
    match response.status() {
        StatusCode::OK => Ok(response),
        status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
            Err(anyhow!("Server error: {}", status))
        }
        status => {
            let error_text = response.text().await?;
            Err(anyhow!("Request failed: {} - {}", status, error_text))
        }
    }
}
