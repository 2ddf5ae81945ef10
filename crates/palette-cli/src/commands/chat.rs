use anyhow::Result;
use cliclack::input;
use console::style;
use futures::stream::{Stream, StreamExt};
use palette::chat::{ChatBridge, Fragment};
use palette::models::conversation::Conversation;
use std::io::{self, Write};
use tracing::debug;

/// How a streamed reply ended
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Complete(String),
    Failed(String),
    Interrupted,
}

pub async fn run(bridge: ChatBridge) -> Result<()> {
    println!(
        "palette chat {}",
        style("- type \"exit\" to end the session").dim()
    );
    println!();

    let mut history = Conversation::new();
    let mut stdout = io::stdout();
    loop {
        let message: String = input("Message:").placeholder("").interact()?;
        if message.trim().eq_ignore_ascii_case("exit") {
            break;
        }

        let fragments = bridge.reply(&message, &history);
        let outcome = tokio::select! {
            outcome = render_reply(fragments, &mut stdout) => outcome?,
            _ = tokio::signal::ctrl_c() => Outcome::Interrupted,
        };
        debug!(turns = history.messages().len(), outcome = ?outcome, "reply finished");

        match outcome {
            Outcome::Complete(reply) => history.record_exchange(message, reply),
            Outcome::Failed(error) => println!("{}", style(error).red()),
            Outcome::Interrupted => println!("{}", style(" Interrupted, reply discarded").yellow()),
        }
        println!();
    }
    Ok(())
}

/// Print each new piece of the reply as it arrives
pub async fn render_reply<S, W>(mut fragments: S, out: &mut W) -> Result<Outcome>
where
    S: Stream<Item = Fragment> + Unpin,
    W: Write,
{
    let mut reply = String::new();
    while let Some(fragment) = fragments.next().await {
        match fragment {
            Fragment::Partial(text) => {
                if let Some(delta) = text.get(reply.len()..) {
                    write!(out, "{}", delta)?;
                    out.flush()?;
                }
                reply = text;
            }
            Fragment::Error(message) => {
                if !reply.is_empty() {
                    writeln!(out)?;
                }
                return Ok(Outcome::Failed(message));
            }
        }
    }
    writeln!(out)?;
    Ok(Outcome::Complete(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_prints_only_new_text() {
        let fragments = stream::iter(vec![
            Fragment::Partial("Hel".to_string()),
            Fragment::Partial("Hello".to_string()),
            Fragment::Partial("Hello there".to_string()),
        ]);

        let mut out = Vec::new();
        let outcome = render_reply(fragments, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::Complete("Hello there".to_string()));
        assert_eq!(String::from_utf8(out).unwrap(), "Hello there\n");
    }

    #[tokio::test]
    async fn test_error_ends_the_reply() {
        let fragments = stream::iter(vec![
            Fragment::Partial("Partial answ".to_string()),
            Fragment::Error("An error occurred: Server error: 529".to_string()),
        ]);

        let mut out = Vec::new();
        let outcome = render_reply(fragments, &mut out).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Failed("An error occurred: Server error: 529".to_string())
        );
        assert_eq!(String::from_utf8(out).unwrap(), "Partial answ\n");
    }

    #[tokio::test]
    async fn test_empty_reply_completes() {
        let mut out = Vec::new();
        let outcome = render_reply(stream::iter(Vec::<Fragment>::new()), &mut out)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Complete(String::new()));
    }
}
