//! Core types for the note-to-store sync pipeline.

use serde::{Deserialize, Serialize};

/// Card syntax style. A closed set: every card is one of these two shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStyle {
    /// Question and answer separated by line structure, marked by a tag line.
    Block,
    /// Question and answer on one line, separated by an inline token.
    Inline,
}

/// Settings governing parsing and identifier-marker placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Deck used when the note declares none and no folder deck applies.
    pub default_deck: String,
    /// Tag (without `#`) that marks a block-style card.
    pub flashcards_tag: String,
    /// Inline question/answer separator.
    pub inline_separator: String,
    /// Inline separator for reversed cards.
    pub inline_separator_reverse: String,
    /// Derive the deck name from the note's folder path when none is declared.
    pub folder_based_deck: bool,
    /// Inline markers go on the same line (` ^id`) when true, on the next
    /// line (`\n^id`) otherwise.
    pub inline_id_same_line: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_deck: "Default".to_string(),
            flashcards_tag: "card".to_string(),
            inline_separator: "::".to_string(),
            inline_separator_reverse: ":::".to_string(),
            folder_based_deck: true,
            inline_id_same_line: true,
        }
    }
}

/// The remote store's view of a previously created note. Read-only to the
/// core; produced by the [`FlashcardStore`](crate::store::FlashcardStore)
/// implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNote {
    pub note_id: i64,
    /// Physical card instances behind this note (two for reversed pairs).
    pub card_ids: Vec<i64>,
    pub tags: Vec<String>,
    pub deck_name: Option<String>,
    /// Rendered field values, question first.
    pub fields: Vec<String>,
}

/// One parsed flashcard unit with question/answer content, tags and optional
/// remote identity.
///
/// Cards are rebuilt from scratch on every parse pass; identity across passes
/// is recovered solely through the identifier marker embedded in the text.
#[derive(Debug, Clone)]
pub struct Card {
    pub style: CardStyle,
    pub question: String,
    pub answer: String,
    /// Exact source slice this card was matched from.
    pub original_content: String,
    pub deck_name: String,
    pub vault_name: String,
    pub source_path: String,
    /// Ordered; duplicates are allowed.
    pub tags: Vec<String>,
    /// Remote identifier; `None` until the first successful creation.
    pub id: Option<i64>,
    /// True iff `id` is set and the marker is known to be written in the text.
    pub inserted: bool,
    /// Byte offset in the original text immediately after this card's content
    /// (or after its existing marker). Parse-time value; the patcher applies
    /// drift deltas on top, never re-scans.
    pub end_offset: usize,
    /// Remote tags observed before an update, for tag-delta computation.
    pub old_tags: Option<Vec<String>>,
    /// The card also implies a mirrored remote pair (affects counts only).
    pub reversed: bool,
    pub media_names: Vec<String>,
    pub media_base64: Vec<String>,
}

impl Card {
    /// Field values in upload order, question first.
    pub fn fields(&self) -> Vec<String> {
        vec![self.question.clone(), self.answer.clone()]
    }

    /// Whether this card's current content still equals what the store holds.
    /// Tags are part of the equality contract.
    pub fn matches_remote(&self, remote: &RemoteNote) -> bool {
        self.fields() == remote.fields && self.tags == remote.tags
    }

    /// Marker text to splice into the note once the card exists remotely.
    /// Block markers get their own line; inline placement follows settings.
    pub fn id_marker(&self, settings: &SyncSettings) -> Option<String> {
        let id = self.id?;
        let marker = match self.style {
            CardStyle::Block => format!("\n^{id}"),
            CardStyle::Inline if settings.inline_id_same_line => format!(" ^{id}"),
            CardStyle::Inline => format!("\n^{id}"),
        };
        Some(marker)
    }
}
