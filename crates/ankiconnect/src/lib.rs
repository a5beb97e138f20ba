//! Typed async client for the AnkiConnect local HTTP API.
//!
//! AnkiConnect is the add-on that exposes a running Anki desktop instance as
//! a JSON-over-HTTP automation endpoint (one POST target, action-dispatched).
//! This crate covers the subset of actions needed for deck, note, and tag
//! management plus sync, and layers two composites on top: note search with
//! flattened fields, and whole-set tag replacement.
//!
//! It intentionally contains **no** MCP or transport-protocol logic; that
//! lives in the serving crate.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AnkiClient, DEFAULT_TIMEOUT, DEFAULT_URL};
pub use error::{AnkiConnectError, Result};
pub use types::{NoteField, NoteInfo, NoteInput, NoteOptions, NoteSummary, NoteUpdate};
