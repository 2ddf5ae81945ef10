use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One incremental piece of a streamed completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    /// Text to append to the reply so far, possibly empty
    pub text: String,
    /// Set on the last chunk of the completion
    pub is_final: bool,
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn finished(usage: Option<Usage>) -> Self {
        Self {
            text: String::new(),
            is_final: true,
            usage,
        }
    }
}

/// Chunks in the order the upstream API delivered them
pub type ProviderStream = BoxStream<'static, Result<StreamChunk>>;

/// Base trait for streaming chat-completion providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start streaming the next assistant message for the conversation
    ///
    /// An error before the first chunk means the request was never accepted;
    /// errors after that arrive as items of the stream.
    async fn stream(&self, system: &str, messages: &[Message]) -> Result<ProviderStream>;
}
