use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::providers::base::{Provider, ProviderStream, StreamChunk};

/// One scripted step of a mock completion stream
#[derive(Debug, Clone)]
pub enum MockStep {
    Text(String),
    Finish,
    Fail(String),
}

/// A mock provider that replays pre-configured streams for testing
pub struct MockProvider {
    steps: Vec<MockStep>,
    refuse: Option<String>,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider that streams the given steps on every call
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps,
            refuse: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider whose stream never starts
    pub fn refusing<S: Into<String>>(reason: S) -> Self {
        Self {
            refuse: Some(reason.into()),
            ..Self::new(Vec::new())
        }
    }

    /// The message lists the provider has been asked to complete, in call order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(&self, _system: &str, messages: &[Message]) -> Result<ProviderStream> {
        self.seen.lock().unwrap().push(messages.to_vec());
        if let Some(reason) = &self.refuse {
            return Err(anyhow!(reason.clone()));
        }

        let items: Vec<Result<StreamChunk>> = self
            .steps
            .iter()
            .map(|step| match step {
                MockStep::Text(text) => Ok(StreamChunk::text(text.clone())),
                MockStep::Finish => Ok(StreamChunk::finished(None)),
                MockStep::Fail(reason) => Err(anyhow!(reason.clone())),
            })
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }
}
