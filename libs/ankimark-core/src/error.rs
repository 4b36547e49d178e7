//! Error types for ankimark-core.

use thiserror::Error;

/// Result type alias using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during a sync run.
///
/// `RemoteUnreachable`, `SchemaCreation`, `MediaRead` and `MediaUpload` abort
/// the run. Per-batch update/delete failures are caught inside the engine and
/// reported as notifications instead of surfacing here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no active note to sync")]
    NoActiveSource,

    #[error("no metadata found for note")]
    NoMetadata,

    #[error("flashcard store unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("could not create note models: {0}")]
    SchemaCreation(String),

    #[error("could not read media file '{name}'")]
    MediaRead { name: String },

    #[error("could not upload media file '{name}': {reason}")]
    MediaUpload { name: String, reason: String },

    #[error("store request failed: {0}")]
    Store(String),

    #[error("malformed store response: {0}")]
    Protocol(String),
}
