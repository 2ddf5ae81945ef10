//! Line framing in front of the MCP service.
//!
//! The SDK transport ends the session on a line it cannot decode. [`line_guard`] reads
//! the raw byte stream itself, answers malformed lines with a JSON-RPC error, and hands
//! only well formed messages to the service through an in-memory pipe.
use rmcp::model::{ClientJsonRpcMessage, ErrorCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadHalf,
    WriteHalf,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const PIPE_CAPACITY: usize = 64 * 1024;
const OUTPUT_QUEUE: usize = 32;
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// The task that owns the real writer.
pub struct OutputTask(JoinHandle<()>);

impl OutputTask {
    /// Wait for the remaining output to reach the writer once the service has stopped
    pub async fn drain(self) {
        if tokio::time::timeout(DRAIN_GRACE, self.0).await.is_err() {
            warn!("output still pending at shutdown");
        }
    }
}

/// Split `reader`/`writer` into a service stream that only ever sees decodable messages.
///
/// Lines are forwarded in arrival order. Every line written to `writer`, whether a
/// service reply or a guard error, is a complete newline terminated message.
pub fn line_guard<R, W>(reader: R, writer: W) -> (DuplexStream, OutputTask)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (io, guard_end) = tokio::io::duplex(PIPE_CAPACITY);
    let (from_service, to_service) = tokio::io::split(guard_end);
    let (tx, rx) = mpsc::channel(OUTPUT_QUEUE);

    tokio::spawn(forward_input(BufReader::new(reader), to_service, tx.clone()));
    tokio::spawn(forward_output(from_service, tx));
    let writer = tokio::spawn(write_lines(rx, writer));

    (io, OutputTask(writer))
}

async fn forward_input<R>(
    mut reader: BufReader<R>,
    mut to_service: WriteHalf<DuplexStream>,
    errors: mpsc::Sender<Vec<u8>>,
) where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "input failed");
                break;
            }
        }

        let message = trim_line(&line);
        if message.is_empty() {
            continue;
        }

        match check_message(message) {
            Ok(()) => {
                let forwarded = async {
                    to_service.write_all(message).await?;
                    to_service.write_all(b"\n").await?;
                    to_service.flush().await
                };
                if let Err(e) = forwarded.await {
                    debug!(error = %e, "service stopped reading");
                    break;
                }
            }
            Err(Some(reply)) => {
                if errors.send(encode(&reply)).await.is_err() {
                    break;
                }
            }
            Err(None) => {}
        }
    }

    // Closing our end lets the service see end of input
    if let Err(e) = to_service.shutdown().await {
        debug!(error = %e, "service pipe already closed");
    }
}

async fn forward_output(from_service: ReadHalf<DuplexStream>, output: mpsc::Sender<Vec<u8>>) {
    let mut reader = BufReader::new(from_service);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if !line.ends_with(b"\n") {
                    line.push(b'\n');
                }
                if output.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "service output failed");
                break;
            }
        }
    }
}

async fn write_lines<W>(mut rx: mpsc::Receiver<Vec<u8>>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        let written = async {
            writer.write_all(&line).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            warn!(error = %e, "output closed");
            break;
        }
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && line[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let start = line[..end]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(end);
    &line[start..end]
}

/// `Ok` when the service can decode the line. Otherwise the error reply to send back,
/// or `None` when the line carries no id to answer.
fn check_message(line: &[u8]) -> Result<(), Option<Value>> {
    let value: Value = match serde_json::from_slice(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "discarding malformed message");
            return Err(Some(error_reply(
                Value::Null,
                ErrorCode::PARSE_ERROR,
                format!("Parse error: {}", e),
            )));
        }
    };

    match serde_json::from_value::<ClientJsonRpcMessage>(value.clone()) {
        Ok(_) => Ok(()),
        Err(e) => {
            let id = value.get("id").cloned().filter(|id| !id.is_null());
            warn!(error = %e, has_id = id.is_some(), "discarding invalid message");
            Err(id.map(|id| {
                error_reply(
                    id,
                    ErrorCode::INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                )
            }))
        }
    }
}

fn error_reply(id: Value, code: ErrorCode, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code.0, "message": message},
    })
}

fn encode(reply: &Value) -> Vec<u8> {
    let mut line = reply.to_string().into_bytes();
    line.push(b'\n');
    line
}
