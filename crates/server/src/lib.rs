//! MCP stdio server exposing Anki deck and note management as tools.
//!
//! Thin by construction: the tool surface maps one-to-one onto AnkiConnect
//! operations (see the `ankiconnect` crate), the transport is line-delimited
//! JSON-RPC on stdin/stdout, and no state outlives a call.

pub mod error;
pub mod stdio;
pub mod tools;

pub use error::{Result, ServerError};
pub use stdio::McpServer;
pub use tools::AnkiToolSource;
