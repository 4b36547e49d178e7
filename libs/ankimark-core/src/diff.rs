//! Classifies parsed cards against the remote store's records.

use std::collections::HashSet;

use crate::types::{Card, RemoteNote};

/// Outcome of comparing one parse pass against the store.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Cards with no identifier yet.
    pub to_create: Vec<Card>,
    /// Inserted cards whose content or tags drifted from the store.
    pub to_update: Vec<Card>,
    /// Inserted cards whose identifier no longer exists remotely. Surfaced
    /// as warnings, never auto-recreated.
    pub missing_remotely: Vec<Card>,
}

/// Partition cards by what the store needs to hear about them. Cards whose
/// content and tags still match their remote record produce no action.
/// This never assigns ids; only the orchestrator does, after a create.
pub fn reconcile(remote: &[RemoteNote], local: Vec<Card>) -> Reconciliation {
    let mut rec = Reconciliation::default();
    for mut card in local {
        if !card.inserted {
            rec.to_create.push(card);
            continue;
        }
        match remote.iter().find(|r| Some(r.note_id) == card.id) {
            None => rec.missing_remotely.push(card),
            Some(record) => {
                if !card.matches_remote(record) {
                    card.old_tags = Some(record.tags.clone());
                    rec.to_update.push(card);
                }
            }
        }
    }
    rec
}

/// Deletion candidates: every remote record of the note's deck whose id no
/// longer appears among the identifiers embedded in the note text. The
/// embedded markers are the reference set, so a card whose surrounding
/// syntax broke still keeps its remote note alive as long as its marker
/// survives.
pub fn compute_deletions(deck_records: &[RemoteNote], embedded_ids: &[i64]) -> Vec<i64> {
    let present: HashSet<i64> = embedded_ids.iter().copied().collect();
    deck_records
        .iter()
        .filter(|record| !present.contains(&record.note_id))
        .map(|record| record.note_id)
        .collect()
}
