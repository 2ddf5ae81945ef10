use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use palette::{
    chat::{Fragment, EMPTY_PROMPT_MESSAGE},
    models::{conversation::Conversation, message::Message, role::Role},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

// Types matching the incoming JSON structure
#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

/// A past turn as the UI remembers it: either a single message or a `[user, assistant]` pair
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryEntry {
    // Tried first: a struct variant would also accept a two element array
    Pair(String, String),
    Turn { role: String, content: String },
}

// Custom SSE response type that implements the data stream protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = Body::from_stream(self);

        (
            [
                ("content-type", "text/event-stream"),
                ("cache-control", "no-cache"),
                ("connection", "keep-alive"),
                ("x-vercel-ai-data-stream", "v1"),
            ],
            body,
        )
            .into_response()
    }
}

// Convert the UI's history into a conversation, oldest turn first
fn convert_history(incoming: Vec<HistoryEntry>) -> Conversation {
    let mut conversation = Conversation::new();

    for entry in incoming {
        match entry {
            HistoryEntry::Turn { role, content } => match role.parse::<Role>() {
                Ok(role) => conversation.push(Message::new(role).with_text(content)),
                Err(e) => tracing::warn!("{}", e),
            },
            HistoryEntry::Pair(user, assistant) => conversation.record_exchange(user, assistant),
        }
    }

    conversation
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        // Text parts start with "0:"
        let encoded_text = serde_json::to_string(text).unwrap_or_default();
        format!("0:{}\n", encoded_text)
    }

    fn format_error(message: &str) -> String {
        // Error parts start with "3:"
        let encoded_message = serde_json::to_string(message).unwrap_or_default();
        format!("3:{}\n", encoded_message)
    }

    fn format_finish(reason: &str) -> String {
        // Finish messages start with "d:"
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            }
        });
        format!("d:{}\n", finish)
    }
}

/// Tracks how much of the growing reply the client has already been sent
#[derive(Default)]
struct ReplyCursor {
    sent: usize,
}

impl ReplyCursor {
    /// The part of `reply` the client has not seen yet
    fn advance(&mut self, reply: &str) -> Option<String> {
        if reply.len() <= self.sent {
            return None;
        }
        let delta = reply.get(self.sent..)?.to_string();
        self.sent = reply.len();
        Some(delta)
    }
}

async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, StatusCode> {
    // Check protocol header (optional in our case)
    if let Some(protocol) = headers.get("x-protocol") {
        if protocol.to_str().map(|p| p != "data").unwrap_or(true) {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    let history = convert_history(request.history);
    let mut fragments = state.bridge.reply(&request.message, &history);

    // Spawn task to handle streaming
    tokio::spawn(async move {
        let mut cursor = ReplyCursor::default();
        let mut finish_reason = "stop";

        loop {
            match timeout(Duration::from_millis(500), fragments.next()).await {
                Ok(Some(Fragment::Partial(reply))) => {
                    if let Some(delta) = cursor.advance(&reply) {
                        if let Err(e) = tx.send(ProtocolFormatter::format_text(&delta)).await {
                            tracing::error!("Error sending message through channel: {}", e);
                            break;
                        }
                    }
                }
                Ok(Some(Fragment::Error(message))) => {
                    finish_reason = "error";
                    if let Err(e) = tx.send(ProtocolFormatter::format_error(&message)).await {
                        tracing::error!("Error sending message through channel: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    break;
                }
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients and drop the upstream request
                    if tx.is_closed() {
                        tracing::info!("client disconnected, abandoning reply");
                        break;
                    }
                    continue;
                }
            }
        }

        // Send finish message
        let _ = tx.send(ProtocolFormatter::format_finish(finish_reason)).await;
    });

    Ok(SseResponse::new(stream))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    prompt: String,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

// simple ask an AI for a response, non streaming
async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<ErrorResponse>)> {
    if request.prompt.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: EMPTY_PROMPT_MESSAGE.to_string(),
            }),
        ));
    }

    let history = convert_history(request.history);
    match state.bridge.ask(&request.prompt, &history).await {
        Ok(response) => Ok(Json(AskResponse { response })),
        Err(e) => {
            tracing::error!("Error processing ask request: {}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/reply", post(handler))
        .route("/ask", post(ask_handler))
        .with_state(state)
}
