//! Contracts to the external collaborators: the remote flashcard store and
//! the media resolver. The engine only ever talks to these traits; hosts
//! supply the concrete transport.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Card, RemoteNote};

/// Capability set of the remote flashcard store.
///
/// Batched operations take whole slices so implementations can issue one
/// round trip per operation class instead of one per card.
#[async_trait]
pub trait FlashcardStore: Send + Sync {
    /// Make sure the note models the cards are created with exist.
    async fn ensure_schema(&self) -> Result<()>;

    /// Create the deck if it does not exist yet.
    async fn ensure_deck(&self, name: &str) -> Result<()>;

    /// Every record currently stored in the given deck.
    async fn records_for_deck(&self, name: &str) -> Result<Vec<RemoteNote>>;

    /// Records for the given note ids. Unknown ids are simply absent from
    /// the result; they must not fail the call.
    async fn records_by_ids(&self, ids: &[i64]) -> Result<Vec<RemoteNote>>;

    /// Create notes for the given cards. The result is parallel to the
    /// input; `None` means the store rejected that card (duplicate
    /// suspected).
    async fn create_many(&self, cards: &[Card]) -> Result<Vec<Option<i64>>>;

    /// Push content and tag changes for the given cards. Returns the ids
    /// that were updated.
    async fn update_many(&self, cards: &[Card]) -> Result<Vec<i64>>;

    /// Delete the given notes.
    async fn delete_many(&self, note_ids: &[i64]) -> Result<()>;

    /// The deck currently holding the given notes, when they all live in
    /// one.
    async fn current_deck(&self, note_ids: &[i64]) -> Result<Option<String>>;

    /// Move card instances into the given deck.
    async fn move_to_deck(&self, card_ids: &[i64], deck: &str) -> Result<()>;

    /// Store one media file under the given name.
    async fn store_media(&self, name: &str, data_base64: &str) -> Result<()>;
}

/// Resolves an embedded media reference to its binary content.
pub trait MediaResolver: Send + Sync {
    /// `Ok(None)` when the reference points nowhere; an `Err` means the file
    /// exists but could not be read, which aborts the run.
    fn resolve(&self, name: &str, source_path: &str) -> Result<Option<Vec<u8>>>;
}
