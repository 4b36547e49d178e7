//! AnkiConnect HTTP client implementing the store contract.
//!
//! AnkiConnect speaks a single-endpoint JSON protocol: every call posts
//! `{action, version, params}` and gets `{result, error}` back.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

use ankimark_core::{Card, FlashcardStore, RemoteNote, Result, SyncError};

const PROTOCOL_VERSION: u32 = 6;
const MODEL_BASIC: &str = "Markdown-basic";
const MODEL_REVERSED: &str = "Markdown-basic-reversed";

pub struct AnkiClient {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    action: &'a str,
    version: u32,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// One entry of a `notesInfo` response. Unknown ids come back as empty
/// objects, which simply fail to deserialize and are skipped.
#[derive(Debug, Deserialize)]
struct NoteInfo {
    #[serde(rename = "noteId")]
    note_id: i64,
    tags: Vec<String>,
    fields: HashMap<String, NoteField>,
    cards: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct NoteField {
    value: String,
    order: u32,
}

impl AnkiClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Probe the endpoint; AnkiConnect answers `version` with its protocol
    /// number.
    pub async fn ping(&self) -> Result<u32> {
        self.invoke("version", json!({})).await
    }

    async fn call(&self, action: &str, params: Value) -> Result<Value> {
        debug!(action, "calling store");
        let request = Request {
            action,
            version: PROTOCOL_VERSION,
            params,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnreachable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SyncError::Store(format!(
                "{action}: unexpected status {}",
                resp.status()
            )));
        }
        let body: Response = resp
            .json()
            .await
            .map_err(|e| SyncError::Protocol(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(SyncError::Store(format!("{action}: {error}")));
        }
        Ok(body.result)
    }

    async fn invoke<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T> {
        let result = self.call(action, params).await?;
        serde_json::from_value(result)
            .map_err(|e| SyncError::Protocol(format!("{action}: {e}")))
    }

    async fn notes_info(&self, note_ids: &[i64]) -> Result<Vec<RemoteNote>> {
        let raw: Vec<Value> = self
            .invoke("notesInfo", json!({ "notes": note_ids }))
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|value| serde_json::from_value::<NoteInfo>(value).ok())
            .map(remote_note)
            .collect())
    }

    async fn create_model(&self, name: &str, reversed: bool) -> Result<()> {
        let mut templates = vec![json!({
            "Name": "Card 1",
            "Front": "{{Front}}",
            "Back": "{{FrontSide}}<hr id=\"answer\">{{Back}}",
        })];
        if reversed {
            templates.push(json!({
                "Name": "Card 2",
                "Front": "{{Back}}",
                "Back": "{{FrontSide}}<hr id=\"answer\">{{Front}}",
            }));
        }
        self.call(
            "createModel",
            json!({
                "modelName": name,
                "inOrderFields": ["Front", "Back"],
                "cardTemplates": templates,
            }),
        )
        .await?;
        Ok(())
    }
}

fn remote_note(info: NoteInfo) -> RemoteNote {
    let mut ordered: Vec<(u32, String)> = info
        .fields
        .into_values()
        .map(|field| (field.order, field.value))
        .collect();
    ordered.sort_by_key(|(order, _)| *order);
    RemoteNote {
        note_id: info.note_id,
        card_ids: info.cards,
        tags: info.tags,
        deck_name: None,
        fields: ordered.into_iter().map(|(_, value)| value).collect(),
    }
}

fn note_payload(card: &Card) -> Value {
    json!({
        "deckName": card.deck_name,
        "modelName": if card.reversed { MODEL_REVERSED } else { MODEL_BASIC },
        "fields": {
            "Front": card.question,
            "Back": card.answer,
        },
        "tags": card.tags,
        "options": { "allowDuplicate": false },
    })
}

/// Tags to add and to remove, given what the store held before the update.
fn tag_delta(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let to_add = new.iter().filter(|t| !old.contains(t)).cloned().collect();
    let to_remove = old.iter().filter(|t| !new.contains(t)).cloned().collect();
    (to_add, to_remove)
}

/// Errors during model creation are schema failures, which abort the run.
fn schema_error(err: SyncError) -> SyncError {
    match err {
        SyncError::Store(msg) | SyncError::Protocol(msg) => SyncError::SchemaCreation(msg),
        other => other,
    }
}

#[async_trait]
impl FlashcardStore for AnkiClient {
    async fn ensure_schema(&self) -> Result<()> {
        let names: Vec<String> = self
            .invoke("modelNames", json!({}))
            .await
            .map_err(schema_error)?;
        if !names.iter().any(|n| n == MODEL_BASIC) {
            self.create_model(MODEL_BASIC, false)
                .await
                .map_err(schema_error)?;
        }
        if !names.iter().any(|n| n == MODEL_REVERSED) {
            self.create_model(MODEL_REVERSED, true)
                .await
                .map_err(schema_error)?;
        }
        Ok(())
    }

    async fn ensure_deck(&self, name: &str) -> Result<()> {
        self.call("createDeck", json!({ "deck": name })).await?;
        Ok(())
    }

    async fn records_for_deck(&self, name: &str) -> Result<Vec<RemoteNote>> {
        let ids: Vec<i64> = self
            .invoke("findNotes", json!({ "query": format!("deck:\"{name}\"") }))
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.notes_info(&ids).await
    }

    async fn records_by_ids(&self, ids: &[i64]) -> Result<Vec<RemoteNote>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.notes_info(ids).await
    }

    async fn create_many(&self, cards: &[Card]) -> Result<Vec<Option<i64>>> {
        let notes: Vec<Value> = cards.iter().map(note_payload).collect();
        self.invoke("addNotes", json!({ "notes": notes })).await
    }

    async fn update_many(&self, cards: &[Card]) -> Result<Vec<i64>> {
        let mut actions = Vec::new();
        let mut updated = Vec::new();
        for card in cards {
            let Some(id) = card.id else { continue };
            actions.push(json!({
                "action": "updateNoteFields",
                "version": PROTOCOL_VERSION,
                "params": {
                    "note": {
                        "id": id,
                        "fields": { "Front": card.question, "Back": card.answer },
                    }
                }
            }));
            let (to_add, to_remove) = tag_delta(card.old_tags.as_deref().unwrap_or(&[]), &card.tags);
            if !to_remove.is_empty() {
                actions.push(json!({
                    "action": "removeTags",
                    "version": PROTOCOL_VERSION,
                    "params": { "notes": [id], "tags": to_remove.join(" ") }
                }));
            }
            if !to_add.is_empty() {
                actions.push(json!({
                    "action": "addTags",
                    "version": PROTOCOL_VERSION,
                    "params": { "notes": [id], "tags": to_add.join(" ") }
                }));
            }
            updated.push(id);
        }
        if actions.is_empty() {
            return Ok(Vec::new());
        }
        self.call("multi", json!({ "actions": actions })).await?;
        Ok(updated)
    }

    async fn delete_many(&self, note_ids: &[i64]) -> Result<()> {
        self.call("deleteNotes", json!({ "notes": note_ids })).await?;
        Ok(())
    }

    async fn current_deck(&self, note_ids: &[i64]) -> Result<Option<String>> {
        let notes = self.notes_info(note_ids).await?;
        let card_ids: Vec<i64> = notes.iter().flat_map(|n| n.card_ids.iter().copied()).collect();
        if card_ids.is_empty() {
            return Ok(None);
        }
        let decks: HashMap<String, Vec<i64>> = self
            .invoke("getDecks", json!({ "cards": card_ids }))
            .await?;
        // One note's cards all live in one deck; with several, report the
        // deck holding most of them.
        Ok(decks
            .into_iter()
            .max_by_key(|(_, cards)| cards.len())
            .map(|(deck, _)| deck))
    }

    async fn move_to_deck(&self, card_ids: &[i64], deck: &str) -> Result<()> {
        self.call("changeDeck", json!({ "cards": card_ids, "deck": deck }))
            .await?;
        Ok(())
    }

    async fn store_media(&self, name: &str, data_base64: &str) -> Result<()> {
        self.call(
            "storeMediaFile",
            json!({ "filename": name, "data": data_base64 }),
        )
        .await?;
        Ok(())
    }
}
