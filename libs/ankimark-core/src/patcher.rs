//! Inserts identifier markers into note text at parse-time offsets.
//!
//! The patcher trusts the offsets computed during parsing and never re-scans
//! mutated text; every insertion shifts later insertion points, and that
//! shift is carried by an explicit drift accumulator threaded through the
//! pass.

use crate::types::{Card, SyncSettings};

/// Result of one patch pass.
#[derive(Debug)]
pub struct PatchResult {
    pub text: String,
    /// Total drift after the pass, the seed included.
    pub drift: usize,
    /// Whether any marker was written.
    pub modified: bool,
}

/// Write markers for every card that carries an id but is not yet inserted.
///
/// Cards are processed in ascending `end_offset` order; out-of-order
/// insertion would invalidate the offsets of later cards. `initial_drift`
/// folds in the length of an earlier, independent front-block edit made on
/// the same buffer.
pub fn apply_identifiers(
    text: &str,
    cards: &mut [Card],
    settings: &SyncSettings,
    initial_drift: usize,
) -> PatchResult {
    let mut order: Vec<usize> = (0..cards.len()).collect();
    order.sort_by_key(|&i| cards[i].end_offset);

    let mut out = text.to_string();
    let mut drift = initial_drift;
    let mut modified = false;

    for index in order {
        let card = &mut cards[index];
        if card.inserted {
            continue;
        }
        let Some(marker) = card.id_marker(settings) else {
            continue;
        };
        out.insert_str(card.end_offset + drift, &marker);
        drift += marker.len();
        card.inserted = true;
        modified = true;
    }

    PatchResult { text: out, drift, modified }
}
