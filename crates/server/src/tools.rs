//! Tool catalog and dispatch for the Anki tool surface.
//!
//! Ten tools over one AnkiConnect endpoint. Remote failures become
//! `isError` tool results so they reach the calling model; only
//! protocol-shape problems (unknown tool, malformed arguments) are `Err`
//! and surface as JSON-RPC errors.

use ankiconnect::{AnkiClient, AnkiConnectError, NoteInput, NoteOptions, NoteUpdate};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

/// Tool source backed by one AnkiConnect endpoint.
#[derive(Clone)]
pub struct AnkiToolSource {
    client: AnkiClient,
}

impl AnkiToolSource {
    #[must_use]
    pub fn new(client: AnkiClient) -> Self {
        Self { client }
    }

    /// List the MCP `Tool`s exposed by this source.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        all_tools()
    }

    /// Execute a tool call.
    ///
    /// # Errors
    ///
    /// Returns an error only for protocol-shape problems: an unknown tool
    /// name or arguments that do not match the tool's schema. AnkiConnect
    /// failures are `Ok` results with `isError` set.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ToolCallError> {
        debug!(tool = %name, "dispatching tool call");

        let outcome = match name {
            "list_decks" => self.client.deck_names().await.map(|v| json_result(&v)),
            "list_models" => self.client.model_names().await.map(|v| json_result(&v)),
            "get_model_fields" => {
                let args: GetModelFieldsArgs = parse_args(name, arguments)?;
                self.client
                    .model_field_names(&args.model_name)
                    .await
                    .map(|v| json_result(&v))
            }
            "create_deck" => {
                let args: CreateDeckArgs = parse_args(name, arguments)?;
                self.client
                    .create_deck(&args.deck_name)
                    .await
                    .map(|id| json_result(&id))
            }
            "add_note" => {
                let args: AddNoteArgs = parse_args(name, arguments)?;
                let note = NoteInput {
                    deck_name: args.deck_name,
                    model_name: args.model_name,
                    fields: args.fields,
                    options: NoteOptions::allow_duplicate(args.allow_duplicate),
                    tags: args.tags,
                };
                self.client.add_note(&note).await.map(|id| json_result(&id))
            }
            "search_notes" => {
                let args: SearchNotesArgs = parse_args(name, arguments)?;
                self.client
                    .search_notes(&args.query)
                    .await
                    .map(|notes| json_result(&notes))
            }
            "update_note" => {
                let args: UpdateNoteArgs = parse_args(name, arguments)?;
                let update = NoteUpdate {
                    id: args.note_id,
                    fields: args.fields,
                    tags: args.tags,
                };
                self.client
                    .update_note(&update)
                    .await
                    .map(|()| empty_result())
            }
            "update_note_tags" => {
                let args: UpdateNoteTagsArgs = parse_args(name, arguments)?;
                self.client
                    .replace_note_tags(args.note_id, &args.tags)
                    .await
                    .map(|()| empty_result())
            }
            "delete_notes" => {
                let args: DeleteNotesArgs = parse_args(name, arguments)?;
                self.client
                    .delete_notes(&args.note_ids)
                    .await
                    .map(|()| empty_result())
            }
            "sync" => self.client.sync().await.map(|()| empty_result()),
            _ => return Err(ToolCallError::UnknownTool(name.to_string())),
        };

        Ok(match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %name, error = %e, "tool call failed");
                error_result(&e)
            }
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetModelFieldsArgs {
    model_name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateDeckArgs {
    deck_name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AddNoteArgs {
    deck_name: String,
    model_name: String,
    fields: BTreeMap<String, String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    allow_duplicate: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchNotesArgs {
    query: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateNoteArgs {
    note_id: i64,
    #[serde(default)]
    fields: Option<BTreeMap<String, String>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateNoteTagsArgs {
    note_id: i64,
    tags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteNotesArgs {
    note_ids: Vec<i64>,
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolCallError> {
    // Clients may omit `arguments` entirely; treat that as an empty object.
    let arguments = match arguments {
        Value::Null => Value::Object(JsonObject::new()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ToolCallError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

fn json_result<T: serde::Serialize>(value: &T) -> CallToolResult {
    let text = serde_json::to_string(value).unwrap_or_else(|_| String::from("null"));
    CallToolResult::success(vec![Content::text(text)])
}

fn empty_result() -> CallToolResult {
    CallToolResult::success(Vec::new())
}

fn error_result(error: &AnkiConnectError) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(error.to_string())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

/// Every tool this server exposes, in a stable order.
#[must_use]
pub fn all_tools() -> Vec<Tool> {
    vec![
        tool(
            "list_decks",
            "List the names of all decks in the Anki collection.",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
            read_only(),
        ),
        tool(
            "list_models",
            "List the names of all note types (models) in the collection.",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
            read_only(),
        ),
        tool(
            "get_model_fields",
            "Get the field names of a note type, in display order.",
            json!({
                "type": "object",
                "properties": {
                    "model_name": {"type": "string", "description": "Note type name, e.g. \"Basic\"."}
                },
                "required": ["model_name"],
                "additionalProperties": false
            }),
            read_only(),
        ),
        tool(
            "create_deck",
            "Create a deck. Existing decks are left untouched and their id is returned, so calling this twice is safe. Use \"::\" for nesting, e.g. \"Japanese::Vocab\".",
            json!({
                "type": "object",
                "properties": {
                    "deck_name": {"type": "string", "description": "Deck name to create."}
                },
                "required": ["deck_name"],
                "additionalProperties": false
            }),
            additive(true),
        ),
        tool(
            "add_note",
            "Add a note to a deck. Field names must match the note type exactly (e.g. Front and Back for Basic). Duplicates are checked per deck; set allow_duplicate to bypass the check. Returns the new note id.",
            json!({
                "type": "object",
                "properties": {
                    "deck_name": {"type": "string", "description": "Target deck."},
                    "model_name": {"type": "string", "description": "Note type, e.g. \"Basic\"."},
                    "fields": {
                        "type": "object",
                        "description": "Field name to value, matching the note type's fields.",
                        "additionalProperties": {"type": "string"}
                    },
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Tags to attach.",
                        "default": []
                    },
                    "allow_duplicate": {"type": "boolean", "default": false}
                },
                "required": ["deck_name", "model_name", "fields"],
                "additionalProperties": false
            }),
            additive(false),
        ),
        tool(
            "search_notes",
            "Search notes with Anki's query syntax, e.g. \"deck:Japanese\", \"tag:vocab\", \"added:7\", or bare text. Returns each match with its note id, note type, tags, and field values.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Anki search query."}
                },
                "required": ["query"],
                "additionalProperties": false
            }),
            read_only(),
        ),
        tool(
            "update_note",
            "Update fields and/or tags of an existing note. Only the members you pass are changed.",
            json!({
                "type": "object",
                "properties": {
                    "note_id": {"type": "integer", "description": "Id of the note to update."},
                    "fields": {
                        "type": "object",
                        "description": "Field name to new value.",
                        "additionalProperties": {"type": "string"}
                    },
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Full replacement tag list."
                    }
                },
                "required": ["note_id"],
                "additionalProperties": false
            }),
            destructive(true),
        ),
        tool(
            "update_note_tags",
            "Replace the full tag set of a note. Pass an empty list to clear all tags.",
            json!({
                "type": "object",
                "properties": {
                    "note_id": {"type": "integer", "description": "Id of the note to retag."},
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "New tag set; replaces whatever is there."
                    }
                },
                "required": ["note_id", "tags"],
                "additionalProperties": false
            }),
            destructive(true),
        ),
        tool(
            "delete_notes",
            "Permanently delete notes (and their cards) by id.",
            json!({
                "type": "object",
                "properties": {
                    "note_ids": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "description": "Ids of the notes to delete."
                    }
                },
                "required": ["note_ids"],
                "additionalProperties": false
            }),
            destructive(true),
        ),
        tool(
            "sync",
            "Sync the collection with AnkiWeb.",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
            sync_annotations(),
        ),
    ]
}

fn tool(
    name: &'static str,
    description: &'static str,
    schema: Value,
    annotations: ToolAnnotations,
) -> Tool {
    let schema_obj = schema.as_object().cloned().unwrap_or_else(JsonObject::new);
    let mut tool = Tool::new(name, description, Arc::new(schema_obj));
    tool.annotations = Some(annotations);
    tool
}

// Every tool talks to an external system, so openWorldHint is always true.

fn read_only() -> ToolAnnotations {
    ToolAnnotations {
        title: None,
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        idempotent_hint: Some(true),
        open_world_hint: Some(true),
    }
}

fn additive(idempotent: bool) -> ToolAnnotations {
    ToolAnnotations {
        title: None,
        read_only_hint: Some(false),
        destructive_hint: Some(false),
        idempotent_hint: Some(idempotent),
        open_world_hint: Some(true),
    }
}

fn destructive(idempotent: bool) -> ToolAnnotations {
    ToolAnnotations {
        title: None,
        read_only_hint: Some(false),
        destructive_hint: Some(true),
        idempotent_hint: Some(idempotent),
        open_world_hint: Some(true),
    }
}

fn sync_annotations() -> ToolAnnotations {
    ToolAnnotations {
        title: None,
        read_only_hint: Some(false),
        destructive_hint: Some(false),
        // Whether a second sync changes anything depends on remote state;
        // do not guess.
        idempotent_hint: None,
        open_world_hint: Some(true),
    }
}
