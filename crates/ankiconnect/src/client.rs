//! AnkiConnect client: envelope codec plus one method per action.
//!
//! AnkiConnect is a single-endpoint JSON API: every call is a POST of
//! `{"action": ..., "version": 6, "params": {...}}` and every response is
//! `{"result": ..., "error": ...}`. The client holds no connection state;
//! each call builds its own transport and drops it on the way out.

use crate::error::{AnkiConnectError, Result};
use crate::types::{NoteInfo, NoteInput, NoteSummary, NoteUpdate};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Endpoint the AnkiConnect add-on listens on out of the box.
pub const DEFAULT_URL: &str = "http://localhost:8765";

/// AnkiConnect API version sent with every request.
pub const API_VERSION: u32 = 6;

/// Per-call timeout applied unless overridden with [`AnkiClient::with_timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RequestEnvelope<'a> {
    action: &'a str,
    version: u32,
    // Omitted entirely for parameterless actions, never sent as `{}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Handle to one AnkiConnect endpoint.
///
/// Cheap to clone; carries only the endpoint URL and the timeout.
#[derive(Debug, Clone)]
pub struct AnkiClient {
    endpoint: Url,
    timeout: Duration,
}

impl AnkiClient {
    /// Build a client for the given endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the URL does not parse.
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| AnkiConnectError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send one action and return the raw `result` value.
    ///
    /// # Errors
    ///
    /// - `Unreachable` if the endpoint cannot be reached or the call times out
    /// - `Http` for a non-success status
    /// - `Anki` when the response envelope carries an error string
    /// - `InvalidResponse` when the body is not the envelope shape
    pub async fn request(&self, action: &str, params: Option<Value>) -> Result<Value> {
        let envelope = RequestEnvelope {
            action,
            version: API_VERSION,
            params: params.as_ref(),
        };
        debug!(action, "sending AnkiConnect request");

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let response = client
            .post(self.endpoint.clone())
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnkiConnectError::Http {
                status: status.as_u16(),
            });
        }

        let body: ResponseEnvelope = response.json().await?;
        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            return Err(AnkiConnectError::Anki(error));
        }
        Ok(body.result)
    }

    /// Names of all decks in the collection.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn deck_names(&self) -> Result<Vec<String>> {
        let v = self.request("deckNames", None).await?;
        decode("deckNames", v)
    }

    /// Names of all note types (models).
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn model_names(&self) -> Result<Vec<String>> {
        let v = self.request("modelNames", None).await?;
        decode("modelNames", v)
    }

    /// Field names of one note type, in display order.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn model_field_names(&self, model_name: &str) -> Result<Vec<String>> {
        let v = self
            .request("modelFieldNames", Some(json!({"modelName": model_name})))
            .await?;
        decode("modelFieldNames", v)
    }

    /// Create a deck (no-op if it already exists) and return its id.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn create_deck(&self, name: &str) -> Result<i64> {
        let v = self.request("createDeck", Some(json!({"deck": name}))).await?;
        decode("createDeck", v)
    }

    /// Add a note and return its id. Duplicate handling is controlled by
    /// [`NoteInput::options`](crate::types::NoteInput).
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`]. AnkiConnect rejects duplicates and
    /// unknown decks/models through the envelope error, surfaced as `Anki`.
    pub async fn add_note(&self, note: &NoteInput) -> Result<i64> {
        let v = self.request("addNote", Some(json!({"note": note}))).await?;
        decode("addNote", v)
    }

    /// Note ids matching an Anki search query.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn find_notes(&self, query: &str) -> Result<Vec<i64>> {
        let v = self.request("findNotes", Some(json!({"query": query}))).await?;
        decode("findNotes", v)
    }

    /// Full records for the given note ids. Unknown ids come back as
    /// placeholder records, not errors.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn notes_info(&self, note_ids: &[i64]) -> Result<Vec<NoteInfo>> {
        let v = self
            .request("notesInfo", Some(json!({"notes": note_ids})))
            .await?;
        decode("notesInfo", v)
    }

    /// Update fields and/or tags of an existing note.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn update_note(&self, update: &NoteUpdate) -> Result<()> {
        self.request("updateNote", Some(json!({"note": update})))
            .await?;
        Ok(())
    }

    /// Add tags to the given notes. Tags are joined with spaces on the wire,
    /// matching Anki's space-separated tag syntax.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn add_tags(&self, note_ids: &[i64], tags: &[String]) -> Result<()> {
        self.request(
            "addTags",
            Some(json!({"notes": note_ids, "tags": tags.join(" ")})),
        )
        .await?;
        Ok(())
    }

    /// Remove tags from the given notes. Same wire format as [`AnkiClient::add_tags`].
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn remove_tags(&self, note_ids: &[i64], tags: &[String]) -> Result<()> {
        self.request(
            "removeTags",
            Some(json!({"notes": note_ids, "tags": tags.join(" ")})),
        )
        .await?;
        Ok(())
    }

    /// Delete notes (and their cards) permanently.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn delete_notes(&self, note_ids: &[i64]) -> Result<()> {
        self.request("deleteNotes", Some(json!({"notes": note_ids})))
            .await?;
        Ok(())
    }

    /// Trigger a collection sync with AnkiWeb.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn sync(&self) -> Result<()> {
        self.request("sync", None).await?;
        Ok(())
    }

    /// Search and hydrate in one step: `findNotes`, then `notesInfo`, with
    /// each record's fields flattened to plain `name -> value` strings.
    ///
    /// An empty search returns immediately without the second round-trip.
    ///
    /// # Errors
    ///
    /// See [`AnkiClient::request`].
    pub async fn search_notes(&self, query: &str) -> Result<Vec<NoteSummary>> {
        let ids = self.find_notes(query).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let infos = self.notes_info(&ids).await?;
        Ok(infos.into_iter().map(NoteSummary::from).collect())
    }

    /// Replace the full tag set of one note: read the current tags, remove
    /// them, then add the new set.
    ///
    /// The remove and add are separate AnkiConnect calls with nothing
    /// transactional around them; a failure between the two leaves the note
    /// with no tags.
    ///
    /// # Errors
    ///
    /// `NoteNotFound` if the id yields no record; otherwise any error from
    /// the underlying calls.
    pub async fn replace_note_tags(&self, note_id: i64, tags: &[String]) -> Result<()> {
        let infos = self.notes_info(&[note_id]).await?;
        // Unknown ids come back as placeholders whose noteId does not echo
        // the request.
        let Some(current) = infos.into_iter().find(|info| info.note_id == note_id) else {
            return Err(AnkiConnectError::NoteNotFound(note_id));
        };

        if !current.tags.is_empty() {
            self.remove_tags(&[note_id], &current.tags).await?;
        }
        if !tags.is_empty() {
            self.add_tags(&[note_id], tags).await?;
        }
        Ok(())
    }
}

fn decode<T>(action: &str, value: Value) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value)
        .map_err(|e| AnkiConnectError::InvalidResponse(format!("unexpected {action} result: {e}")))
}
