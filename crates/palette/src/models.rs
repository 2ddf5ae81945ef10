//! These models represent the objects passed between the front-ends, the LLM and the tools
//!
//! There are several related formats we need to interact with:
//! - chat UI history, sent from the browser or the terminal to the chat bridge
//! - the data stream protocol, sent from the chat bridge back to the UI
//! - anthropic messages, sent from the chat bridge to the LLM
//! - MCP tool calls and results, exchanged with the tool server
//!
//! We always convert those formats into the internal structs at the edges. The content
//! model is shaped after MCP content items so tool results can be written out directly.
pub mod content;
pub mod conversation;
pub mod message;
pub mod role;
pub mod tool;
