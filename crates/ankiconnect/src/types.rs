//! Request and response shapes for the AnkiConnect actions this crate uses.
//!
//! Serialized names follow AnkiConnect's camelCase wire format; the Rust
//! structs stay snake_case.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Note payload for `addNote`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInput {
    pub deck_name: String,
    pub model_name: String,
    pub fields: BTreeMap<String, String>,
    pub options: NoteOptions,
    pub tags: Vec<String>,
}

/// Duplicate-handling options attached to every `addNote`.
///
/// The duplicate scope is always `"deck"`: duplicates are checked per deck,
/// not across the whole collection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteOptions {
    pub allow_duplicate: bool,
    pub duplicate_scope: String,
}

impl Default for NoteOptions {
    fn default() -> Self {
        Self {
            allow_duplicate: false,
            duplicate_scope: "deck".to_string(),
        }
    }
}

impl NoteOptions {
    #[must_use]
    pub fn allow_duplicate(allow: bool) -> Self {
        Self {
            allow_duplicate: allow,
            ..Self::default()
        }
    }
}

/// Partial note payload for `updateNote`. Absent members are omitted from the
/// wire so AnkiConnect leaves them untouched.
#[derive(Debug, Clone, Serialize)]
pub struct NoteUpdate {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// One field of a `notesInfo` record: the rendered value plus its position in
/// the note type.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteField {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub order: i64,
}

/// One record from `notesInfo`.
///
/// Deliberately lenient: AnkiConnect answers unknown ids with empty
/// placeholder objects, and records carry extra members (`cards`, `mod`)
/// this crate has no use for. Everything defaults so a placeholder decodes
/// instead of failing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInfo {
    #[serde(default)]
    pub note_id: i64,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, NoteField>,
}

/// Flattened search result: `fields` maps field name straight to its string
/// value, with the `{value, order}` nesting stripped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSummary {
    pub note_id: i64,
    pub model_name: String,
    pub tags: Vec<String>,
    pub fields: BTreeMap<String, String>,
}

impl From<NoteInfo> for NoteSummary {
    fn from(info: NoteInfo) -> Self {
        Self {
            note_id: info.note_id,
            model_name: info.model_name,
            tags: info.tags,
            fields: info
                .fields
                .into_iter()
                .map(|(name, field)| (name, field.value))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NoteInfo, NoteInput, NoteOptions, NoteSummary, NoteUpdate};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn note_input_serializes_to_addnote_shape() {
        let note = NoteInput {
            deck_name: "Japanese".to_string(),
            model_name: "Basic".to_string(),
            fields: BTreeMap::from([
                ("Front".to_string(), "犬".to_string()),
                ("Back".to_string(), "dog".to_string()),
            ]),
            options: NoteOptions::default(),
            tags: vec!["vocab".to_string()],
        };

        let v = serde_json::to_value(&note).expect("serialize");
        assert_eq!(
            v,
            json!({
                "deckName": "Japanese",
                "modelName": "Basic",
                "fields": {"Back": "dog", "Front": "犬"},
                "options": {"allowDuplicate": false, "duplicateScope": "deck"},
                "tags": ["vocab"],
            })
        );
    }

    #[test]
    fn note_update_omits_absent_members() {
        let update = NoteUpdate {
            id: 42,
            fields: None,
            tags: Some(vec!["reviewed".to_string()]),
        };
        let v = serde_json::to_value(&update).expect("serialize");
        assert_eq!(v, json!({"id": 42, "tags": ["reviewed"]}));
    }

    #[test]
    fn note_info_tolerates_extra_members_and_placeholders() {
        let full: NoteInfo = serde_json::from_value(json!({
            "noteId": 1502298033753i64,
            "modelName": "Basic",
            "tags": ["vocab"],
            "fields": {"Front": {"value": "Q", "order": 0}},
            "cards": [1502298033754i64],
            "mod": 1718368331,
        }))
        .expect("full record");
        assert_eq!(full.note_id, 1502298033753);
        assert_eq!(full.fields["Front"].value, "Q");

        let placeholder: NoteInfo = serde_json::from_value(json!({})).expect("placeholder");
        assert_eq!(placeholder.note_id, 0);
        assert!(placeholder.fields.is_empty());
    }

    #[test]
    fn summary_flattens_fields_to_plain_values() {
        let info: NoteInfo = serde_json::from_value(json!({
            "noteId": 7,
            "modelName": "Basic",
            "tags": [],
            "fields": {
                "Front": {"value": "Q", "order": 0},
                "Back": {"value": "A", "order": 1},
            },
        }))
        .expect("record");

        let summary = NoteSummary::from(info);
        let v = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(
            v,
            json!({
                "noteId": 7,
                "modelName": "Basic",
                "tags": [],
                "fields": {"Back": "A", "Front": "Q"},
            })
        );
    }
}
