//! Model Context Protocol plumbing for the image generation tool server: a server that
//! exposes a [`palette::systems::System`], a line guard for its stdio, and a matching client.
pub mod client;
pub mod configuration;
pub mod convert;
pub mod server;
pub mod transport;

pub use client::{McpClient, ToolOutput};
pub use server::McpServer;
