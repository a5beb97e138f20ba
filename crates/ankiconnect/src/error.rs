//! Error taxonomy for AnkiConnect calls.
//!
//! Every failure is terminal for the call that produced it; the client never
//! retries. `Anki` carries the remote error string verbatim so callers can
//! match on the exact payload AnkiConnect returned.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnkiConnectError {
    /// The configured endpoint URL failed to parse. Raised at client
    /// construction, before any request is made.
    #[error("invalid AnkiConnect endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// The endpoint could not be reached (connection refused, reset, or
    /// timed out). In practice this means Anki is not running.
    #[error(
        "cannot connect to AnkiConnect ({reason}); is Anki running with the AnkiConnect add-on installed?"
    )]
    Unreachable { reason: String },

    /// The endpoint answered with a non-success HTTP status.
    #[error("AnkiConnect HTTP error: {status}")]
    Http { status: u16 },

    /// The response envelope carried a non-null `error` field. The payload is
    /// the remote message, verbatim.
    #[error("AnkiConnect error: {0}")]
    Anki(String),

    /// The response body was not the expected envelope or result shape.
    #[error("invalid AnkiConnect response: {0}")]
    InvalidResponse(String),

    /// `notesInfo` produced no record for the requested note id.
    #[error("note {0} not found")]
    NoteNotFound(i64),
}

pub type Result<T> = std::result::Result<T, AnkiConnectError>;

impl From<reqwest::Error> for AnkiConnectError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::InvalidResponse(e.to_string());
        }
        // Connect failures, timeouts, and anything else transport-shaped all
        // mean the same thing to the caller: the endpoint is not reachable.
        Self::Unreachable {
            reason: e.to_string(),
        }
    }
}
