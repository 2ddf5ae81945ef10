//! The chat bridge: forwards a prompt and its history to a streaming provider and
//! republishes the reply as it grows.
//!
//! A reply is a plain sequence of [`Fragment`]s. It ends when the sequence ends; a failure
//! shows up as one last [`Fragment::Error`] and never through a separate channel.
use anyhow::{anyhow, Result};
use async_stream::stream;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

use crate::models::conversation::Conversation;
use crate::providers::base::Provider;

pub const EMPTY_PROMPT_MESSAGE: &str = "Please enter a message.";

/// What the UI should display for the assistant's reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// The whole reply received so far, replacing whatever was displayed before
    Partial(String),
    /// A user-visible error; always the last fragment of a reply
    Error(String),
}

impl Fragment {
    fn failure(error: impl std::fmt::Display) -> Self {
        Fragment::Error(format!("An error occurred: {}", error))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Fragment::Error(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Fragment::Partial(text) | Fragment::Error(text) => text,
        }
    }
}

#[derive(Clone)]
pub struct ChatBridge {
    provider: Arc<dyn Provider>,
    system: String,
}

impl ChatBridge {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            system: String::new(),
        }
    }

    /// Set the system prompt sent along with every request
    pub fn with_system<S: Into<String>>(mut self, system: S) -> Self {
        self.system = system.into();
        self
    }

    /// Stream the reply to `prompt` given the earlier turns in `history`
    ///
    /// The history is copied up front, so the caller is free to record the exchange
    /// once the reply completes.
    pub fn reply(&self, prompt: &str, history: &Conversation) -> BoxStream<'static, Fragment> {
        let provider = Arc::clone(&self.provider);
        let system = self.system.clone();
        let blank = prompt.trim().is_empty();
        let messages = history.with_prompt(prompt);

        Box::pin(stream! {
            if blank {
                yield Fragment::Error(EMPTY_PROMPT_MESSAGE.to_string());
                return;
            }

            let mut upstream = match provider.stream(&system, &messages).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    tracing::error!("Failed to start reply stream: {}", e);
                    yield Fragment::failure(e);
                    return;
                }
            };

            let mut reply = String::new();
            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(chunk) => {
                        if !chunk.text.is_empty() {
                            reply.push_str(&chunk.text);
                            yield Fragment::Partial(reply.clone());
                        }
                        if chunk.is_final {
                            tracing::debug!(usage = ?chunk.usage, "reply complete");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error while streaming reply: {}", e);
                        yield Fragment::failure(e);
                        break;
                    }
                }
            }
        })
    }

    /// Wait for the whole reply, for callers that cannot render partial output
    pub async fn ask(&self, prompt: &str, history: &Conversation) -> Result<String> {
        let mut fragments = self.reply(prompt, history);
        let mut reply = String::new();
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Fragment::Partial(text) => reply = text,
                Fragment::Error(message) => return Err(anyhow!(message)),
            }
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::models::role::Role;
    use crate::providers::mock::{MockProvider, MockStep};

    fn text(s: &str) -> MockStep {
        MockStep::Text(s.to_string())
    }

    fn bridge(provider: &Arc<MockProvider>) -> ChatBridge {
        let provider: Arc<dyn Provider> = provider.clone();
        ChatBridge::new(provider).with_system("You are a helpful assistant.")
    }

    #[tokio::test]
    async fn test_partials_extend_the_reply() {
        let provider = Arc::new(MockProvider::new(vec![
            text("Hel"),
            text("lo"),
            text(""),
            text("!"),
            MockStep::Finish,
        ]));

        let fragments: Vec<Fragment> = bridge(&provider)
            .reply("hi", &Conversation::new())
            .collect()
            .await;

        assert_eq!(
            fragments,
            vec![
                Fragment::Partial("Hel".into()),
                Fragment::Partial("Hello".into()),
                Fragment::Partial("Hello!".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_with_one_error() {
        let provider = Arc::new(MockProvider::new(vec![
            text("partial"),
            MockStep::Fail("connection reset".into()),
            text("never shown"),
            MockStep::Fail("also never shown".into()),
        ]));

        let fragments: Vec<Fragment> = bridge(&provider)
            .reply("hi", &Conversation::new())
            .collect()
            .await;

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], Fragment::Partial("partial".into()));
        assert_eq!(
            fragments[1],
            Fragment::Error("An error occurred: connection reset".into())
        );
        assert_eq!(fragments.iter().filter(|f| f.is_error()).count(), 1);
    }

    #[tokio::test]
    async fn test_failure_to_start_is_a_single_error() {
        let provider = Arc::new(MockProvider::refusing("invalid x-api-key"));

        let fragments: Vec<Fragment> = bridge(&provider)
            .reply("hi", &Conversation::new())
            .collect()
            .await;

        assert_eq!(
            fragments,
            vec![Fragment::Error("An error occurred: invalid x-api-key".into())]
        );
    }

    #[tokio::test]
    async fn test_blank_prompt_never_reaches_provider() {
        let provider = Arc::new(MockProvider::new(vec![text("unused")]));

        let fragments: Vec<Fragment> = bridge(&provider)
            .reply("   ", &Conversation::new())
            .collect()
            .await;

        assert_eq!(fragments, vec![Fragment::Error(EMPTY_PROMPT_MESSAGE.into())]);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_final_chunk_stops_the_reply() {
        let provider = Arc::new(MockProvider::new(vec![
            text("done"),
            MockStep::Finish,
            text("trailing"),
        ]));

        let fragments: Vec<Fragment> = bridge(&provider)
            .reply("hi", &Conversation::new())
            .collect()
            .await;

        assert_eq!(fragments, vec![Fragment::Partial("done".into())]);
    }

    #[tokio::test]
    async fn test_history_is_sent_in_order() {
        let provider = Arc::new(MockProvider::new(vec![text("ok"), MockStep::Finish]));
        let history = Conversation::from_pairs(vec![("one", "1"), ("two", "2")]);

        let _: Vec<Fragment> = bridge(&provider).reply("three", &history).collect().await;

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let texts: Vec<String> = requests[0].iter().map(Message::text).collect();
        assert_eq!(texts, vec!["one", "1", "two", "2", "three"]);
        assert_eq!(requests[0][4].role, Role::User);
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_ask_collects_reply() -> Result<()> {
        let provider = Arc::new(MockProvider::new(vec![
            text("a "),
            text("b"),
            MockStep::Finish,
        ]));
        let reply = bridge(&provider).ask("hi", &Conversation::new()).await?;
        assert_eq!(reply, "a b");

        let failing = Arc::new(MockProvider::new(vec![MockStep::Fail("boom".into())]));
        let error = bridge(&failing)
            .ask("hi", &Conversation::new())
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "An error occurred: boom");
        Ok(())
    }
}
