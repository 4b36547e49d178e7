//! Core engine for keeping markdown notes and a remote flashcard store
//! convergent.
//!
//! Provides:
//! - Pattern rules for block and inline card syntax, with positional
//!   front-block exclusion
//! - A card builder attaching tags, deck and media metadata
//! - A diff engine classifying cards into create/update/delete/dangling
//! - A text patcher that writes identifier markers back into the note
//! - A sync orchestrator driving all of the above against store traits

pub mod builder;
pub mod diff;
pub mod engine;
pub mod error;
pub mod frontmatter;
pub mod matcher;
pub mod patcher;
pub mod store;
pub mod types;

pub use diff::{compute_deletions, reconcile, Reconciliation};
pub use engine::{NoteContext, SyncEngine, SyncOutcome, SyncStats};
pub use error::{Result, SyncError};
pub use matcher::{CardPatterns, RawMatch};
pub use patcher::{apply_identifiers, PatchResult};
pub use store::{FlashcardStore, MediaResolver};
pub use types::{Card, CardStyle, RemoteNote, SyncSettings};
