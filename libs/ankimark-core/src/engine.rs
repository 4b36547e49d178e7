//! Sync orchestrator: sequences matching, diffing, remote calls and text
//! patching for one note.
//!
//! A run owns its text buffer exclusively. The buffer is treated as frozen
//! for the whole run; external edits to the same note while a run is in
//! flight are undefined behavior for that run, and overlapping runs on one
//! note must be serialized by the caller.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, error, info, warn};

use crate::builder;
use crate::diff;
use crate::error::{Result, SyncError};
use crate::frontmatter;
use crate::matcher::CardPatterns;
use crate::patcher;
use crate::store::{FlashcardStore, MediaResolver};
use crate::types::{Card, SyncSettings};

/// One note's text snapshot plus the metadata the deck precedence needs.
#[derive(Debug, Clone)]
pub struct NoteContext {
    pub text: String,
    /// Vault-relative path of the note, `/`-separated.
    pub source_path: String,
    pub vault_name: String,
    /// Vault-relative folder holding the note; `None` at the vault root.
    pub folder_path: Option<String>,
}

/// Per-class operation counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Logical cards created; a reversed card counts twice.
    pub created: usize,
    /// Cards the store rejected on create (duplicate suspected).
    pub skipped: usize,
    pub updated: usize,
    pub deleted: usize,
    pub moved: usize,
}

/// What one run produced.
#[derive(Debug)]
pub struct SyncOutcome {
    /// One human-readable message per operation class, in execution order.
    pub notifications: Vec<String>,
    /// The patched note text, present only when something was inserted.
    pub patched_text: Option<String>,
    pub stats: SyncStats,
}

/// Reconciliation engine for one configured card syntax.
pub struct SyncEngine {
    settings: SyncSettings,
    patterns: CardPatterns,
}

impl SyncEngine {
    pub fn new(settings: SyncSettings) -> Self {
        let patterns = CardPatterns::new(&settings);
        Self { settings, patterns }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Deck precedence: explicit `cards-deck:` directive, then the folder
    /// path with `::` separators, then the configured default.
    pub fn resolve_deck_name(&self, note: &NoteContext) -> String {
        if let Some(deck) = frontmatter::declared_deck(&note.text) {
            return deck;
        }
        if self.settings.folder_based_deck {
            if let Some(folder) = note
                .folder_path
                .as_deref()
                .map(|f| f.trim_matches('/'))
                .filter(|f| !f.is_empty())
            {
                return folder.split('/').collect::<Vec<_>>().join("::");
            }
        }
        self.settings.default_deck.clone()
    }

    /// Run one full reconciliation pass for `note` against `store`.
    pub async fn sync<S, M>(&self, note: NoteContext, store: &S, media: &M) -> Result<SyncOutcome>
    where
        S: FlashcardStore + ?Sized,
        M: MediaResolver + ?Sized,
    {
        let mut notifications: Vec<String> = Vec::new();
        let mut stats = SyncStats::default();

        let deck_name = self.resolve_deck_name(&note);
        info!(deck = %deck_name, source = %note.source_path, "starting sync run");

        store.ensure_schema().await?;
        store.ensure_deck(&deck_name).await?;

        let mut text = note.text.clone();
        if !text.ends_with('\n') {
            text.push('\n');
        }

        let global_tags = frontmatter::global_tags(&text);
        let embedded = CardPatterns::embedded_ids(&text);

        let deck_records = store.records_for_deck(&deck_name).await?;
        let known_records = if embedded.is_empty() {
            Vec::new()
        } else {
            store.records_by_ids(&embedded).await?
        };

        let raw = self.patterns.scan(&text);
        let mut cards = builder::build_cards(
            &text,
            &raw,
            &deck_name,
            &note.vault_name,
            &note.source_path,
            &global_tags,
        );
        debug!(cards = cards.len(), embedded = embedded.len(), "parsed note");

        self.upload_media(&mut cards, &note.source_path, store, media)
            .await?;

        let mut rec = diff::reconcile(&known_records, cards);

        for card in &rec.missing_remotely {
            if let Some(id) = card.id {
                warn!(id, "identifier present in note but missing remotely");
                notifications.push(format!("Error: Card with ID {id} is not in Anki!"));
            }
        }

        let to_delete = diff::compute_deletions(&deck_records, &embedded);
        if !to_delete.is_empty() {
            match store.delete_many(&to_delete).await {
                Ok(()) => {
                    stats.deleted = to_delete.len();
                    notifications.push(format!(
                        "Deleted successfully {} cards.",
                        to_delete.len()
                    ));
                }
                Err(err) => {
                    error!(%err, "delete batch failed");
                    notifications.push("Error: Could not delete cards from Anki".to_string());
                }
            }
        }

        if !rec.to_update.is_empty() {
            match store.update_many(&rec.to_update).await {
                Ok(ids) => {
                    stats.updated = ids.len();
                    if !ids.is_empty() {
                        notifications.push(format!("Updated successfully {} cards.", ids.len()));
                    }
                }
                Err(err) => {
                    error!(%err, "update batch failed");
                    notifications.push("Error: Could not update cards on Anki".to_string());
                }
            }
        }

        let mut update_file = false;
        if !rec.to_create.is_empty() {
            match store.create_many(&rec.to_create).await {
                Ok(ids) => {
                    let (created, total) = assign_created_ids(&mut rec.to_create, &ids);
                    stats.created = created;
                    stats.skipped = rec.to_create.iter().filter(|c| c.id.is_none()).count();

                    let mut drift = 0;
                    if let Some((with_directive, inserted)) =
                        frontmatter::insert_deck_directive(&text, &deck_name)
                    {
                        text = with_directive;
                        drift = inserted;
                        update_file = true;
                    }
                    let patch =
                        patcher::apply_identifiers(&text, &mut rec.to_create, &self.settings, drift);
                    if patch.modified {
                        text = patch.text;
                        update_file = true;
                    }

                    if created > 0 {
                        notifications
                            .push(format!("Inserted successfully {created}/{total} cards."));
                    } else {
                        notifications
                            .push(format!("No new cards created ({total} cards already exist)."));
                    }
                }
                Err(err) => {
                    error!(%err, "create batch failed");
                    notifications.push("Error: Could not write cards on Anki".to_string());
                }
            }
        }

        if !known_records.is_empty() {
            match self.move_to_target_deck(store, &known_records, &deck_name).await {
                Ok(Some((moved, previous))) => {
                    stats.moved = moved;
                    notifications.push(format!(
                        "Moved {moved} cards from \"{previous}\" to \"{deck_name}\""
                    ));
                }
                Ok(None) => {}
                Err(err) => {
                    error!(%err, "deck move failed");
                    notifications.push("Error: Could not update card decks".to_string());
                }
            }
        }

        if notifications.is_empty() {
            notifications.push("Nothing to do. Everything is up to date".to_string());
        }

        Ok(SyncOutcome {
            notifications,
            patched_text: update_file.then_some(text),
            stats,
        })
    }

    /// Media files are stored on every run; the store overwrites existing
    /// entries, so no bookkeeping of what was uploaded before is needed.
    async fn upload_media<S, M>(
        &self,
        cards: &mut [Card],
        source_path: &str,
        store: &S,
        media: &M,
    ) -> Result<()>
    where
        S: FlashcardStore + ?Sized,
        M: MediaResolver + ?Sized,
    {
        for card in cards.iter_mut() {
            let names = card.media_names.clone();
            for name in names {
                let Some(bytes) = media.resolve(&name, source_path)? else {
                    warn!(media = %name, "media reference does not resolve, skipping");
                    continue;
                };
                let encoded = BASE64.encode(&bytes);
                store
                    .store_media(&name, &encoded)
                    .await
                    .map_err(|err| SyncError::MediaUpload {
                        name: name.clone(),
                        reason: err.to_string(),
                    })?;
                card.media_base64.push(encoded);
            }
        }
        Ok(())
    }

    /// All cards of one note live in one deck, so a single current-deck
    /// probe decides whether the note's cards need to move.
    async fn move_to_target_deck<S>(
        &self,
        store: &S,
        known_records: &[crate::types::RemoteNote],
        deck_name: &str,
    ) -> Result<Option<(usize, String)>>
    where
        S: FlashcardStore + ?Sized,
    {
        let note_ids: Vec<i64> = known_records.iter().map(|r| r.note_id).collect();
        let Some(current) = store.current_deck(&note_ids).await? else {
            return Ok(None);
        };
        if current == deck_name {
            return Ok(None);
        }
        let card_ids: Vec<i64> = known_records
            .iter()
            .flat_map(|r| r.card_ids.iter().copied())
            .collect();
        if card_ids.is_empty() {
            return Ok(None);
        }
        store.move_to_deck(&card_ids, deck_name).await?;
        Ok(Some((card_ids.len(), current)))
    }
}

/// Copy the store's per-card create results onto the cards. Returns the
/// logical (created, total) counts, where reversed cards weigh double.
fn assign_created_ids(cards: &mut [Card], ids: &[Option<i64>]) -> (usize, usize) {
    let mut created = 0;
    let mut total = 0;
    for (card, id) in cards.iter_mut().zip(ids) {
        let weight = if card.reversed { 2 } else { 1 };
        total += weight;
        match id {
            Some(id) => {
                card.id = Some(*id);
                created += weight;
            }
            None => {
                warn!(question = %card.question, "store rejected card, possibly a duplicate");
            }
        }
    }
    // Cards beyond the store's answer stay uncreated but still count.
    for card in cards.iter().skip(ids.len()) {
        total += if card.reversed { 2 } else { 1 };
    }
    (created, total)
}
