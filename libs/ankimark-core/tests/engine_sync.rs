//! End-to-end engine runs against an in-memory store.

use std::sync::Mutex;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use ankimark_core::{
    Card, FlashcardStore, MediaResolver, NoteContext, RemoteNote, Result, SyncEngine, SyncError,
    SyncSettings,
};

const FIRST_ID: i64 = 1_720_000_000_000;

/// In-memory store. Mutating calls are logged so tests can assert which
/// operation classes a run actually issued.
struct MockStore {
    notes: Mutex<Vec<RemoteNote>>,
    ops: Mutex<Vec<String>>,
    next_id: Mutex<i64>,
    fail_deletes: bool,
}

impl MockStore {
    fn new() -> Self {
        Self::with_notes(Vec::new())
    }

    fn with_notes(notes: Vec<RemoteNote>) -> Self {
        Self {
            notes: Mutex::new(notes),
            ops: Mutex::new(Vec::new()),
            next_id: Mutex::new(FIRST_ID),
            fail_deletes: false,
        }
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn log(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl FlashcardStore for MockStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_deck(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn records_for_deck(&self, name: &str) -> Result<Vec<RemoteNote>> {
        Ok(self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.deck_name.as_deref() == Some(name))
            .cloned()
            .collect())
    }

    async fn records_by_ids(&self, ids: &[i64]) -> Result<Vec<RemoteNote>> {
        Ok(self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| ids.contains(&n.note_id))
            .cloned()
            .collect())
    }

    async fn create_many(&self, cards: &[Card]) -> Result<Vec<Option<i64>>> {
        self.log(format!("create:{}", cards.len()));
        let mut ids = Vec::with_capacity(cards.len());
        for card in cards {
            let id = {
                let mut next = self.next_id.lock().unwrap();
                let id = *next;
                *next += 1;
                id
            };
            self.notes.lock().unwrap().push(RemoteNote {
                note_id: id,
                card_ids: if card.reversed {
                    vec![id + 10_000, id + 10_001]
                } else {
                    vec![id + 10_000]
                },
                tags: card.tags.clone(),
                deck_name: Some(card.deck_name.clone()),
                fields: card.fields(),
            });
            ids.push(Some(id));
        }
        Ok(ids)
    }

    async fn update_many(&self, cards: &[Card]) -> Result<Vec<i64>> {
        self.log(format!("update:{}", cards.len()));
        let mut notes = self.notes.lock().unwrap();
        let mut updated = Vec::new();
        for card in cards {
            let Some(id) = card.id else { continue };
            if let Some(note) = notes.iter_mut().find(|n| n.note_id == id) {
                note.fields = card.fields();
                note.tags = card.tags.clone();
                updated.push(id);
            }
        }
        Ok(updated)
    }

    async fn delete_many(&self, note_ids: &[i64]) -> Result<()> {
        if self.fail_deletes {
            return Err(SyncError::Store("delete refused".to_string()));
        }
        self.log(format!("delete:{}", note_ids.len()));
        self.notes
            .lock()
            .unwrap()
            .retain(|n| !note_ids.contains(&n.note_id));
        Ok(())
    }

    async fn current_deck(&self, note_ids: &[i64]) -> Result<Option<String>> {
        Ok(self
            .notes
            .lock()
            .unwrap()
            .iter()
            .find(|n| note_ids.contains(&n.note_id))
            .and_then(|n| n.deck_name.clone()))
    }

    async fn move_to_deck(&self, card_ids: &[i64], deck: &str) -> Result<()> {
        self.log(format!("move:{}:{deck}", card_ids.len()));
        let mut notes = self.notes.lock().unwrap();
        for note in notes.iter_mut() {
            if note.card_ids.iter().any(|c| card_ids.contains(c)) {
                note.deck_name = Some(deck.to_string());
            }
        }
        Ok(())
    }

    async fn store_media(&self, name: &str, data_base64: &str) -> Result<()> {
        self.log(format!("media:{name}:{data_base64}"));
        Ok(())
    }
}

struct NoMedia;

impl MediaResolver for NoMedia {
    fn resolve(&self, _name: &str, _source_path: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

struct FixedMedia(&'static [u8]);

impl MediaResolver for FixedMedia {
    fn resolve(&self, _name: &str, _source_path: &str) -> Result<Option<Vec<u8>>> {
        Ok(Some(self.0.to_vec()))
    }
}

struct BrokenMedia;

impl MediaResolver for BrokenMedia {
    fn resolve(&self, name: &str, _source_path: &str) -> Result<Option<Vec<u8>>> {
        Err(SyncError::MediaRead {
            name: name.to_string(),
        })
    }
}

fn engine() -> SyncEngine {
    SyncEngine::new(SyncSettings::default())
}

fn note(text: &str) -> NoteContext {
    NoteContext {
        text: text.to_string(),
        source_path: "words.md".to_string(),
        vault_name: "vault".to_string(),
        folder_path: None,
    }
}

fn record(id: i64, deck: &str, fields: [&str; 2], tags: &[&str]) -> RemoteNote {
    RemoteNote {
        note_id: id,
        card_ids: vec![id + 10_000],
        tags: tags.iter().map(|t| t.to_string()).collect(),
        deck_name: Some(deck.to_string()),
        fields: fields.iter().map(|f| f.to_string()).collect(),
    }
}

#[tokio::test]
async fn note_without_cards_issues_no_mutations() {
    let store = MockStore::new();
    let outcome = engine()
        .sync(note("just some prose\n\nno cards here\n"), &store, &NoMedia)
        .await
        .unwrap();

    assert_eq!(
        outcome.notifications,
        vec!["Nothing to do. Everything is up to date"]
    );
    assert_eq!(outcome.patched_text, None);
    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn first_sync_inserts_directive_and_markers_then_converges() {
    let text = "---\ntitle: words\n---\n\n##### Ownership\n#card\nEach value has one owner.\n\napple :: manzana\npear :: pera\n";
    let store = MockStore::new();
    let engine = engine();

    let outcome = engine.sync(note(text), &store, &NoMedia).await.unwrap();

    assert_eq!(outcome.stats.created, 3);
    assert!(outcome
        .notifications
        .contains(&"Inserted successfully 3/3 cards.".to_string()));

    let patched = outcome.patched_text.expect("markers were inserted");
    // One directive insertion inside the front-block...
    assert!(patched.starts_with("---\ntitle: words\ncards-deck: Default\n---\n"));
    // ...and one marker per card.
    assert_eq!(patched.matches("^172").count(), 3);
    assert!(patched.contains("Each value has one owner.\n^1720000000000\n"));
    assert!(patched.contains("apple :: manzana ^1720000000001\n"));
    assert!(patched.contains("pear :: pera ^1720000000002\n"));

    // Second run over the patched text: fully convergent.
    let second = engine.sync(note(&patched), &store, &NoMedia).await.unwrap();
    assert_eq!(
        second.notifications,
        vec!["Nothing to do. Everything is up to date"]
    );
    assert_eq!(second.stats.created, 0);
    assert_eq!(second.stats.updated, 0);
    assert_eq!(second.stats.deleted, 0);
    assert_eq!(second.patched_text, None);
}

#[tokio::test]
async fn marker_offsets_absorb_preceding_insertions() {
    let text = "---\nt: x\n---\na :: 1\nb :: 2\nc :: 3\n";
    let store = MockStore::new();
    let outcome = engine().sync(note(text), &store, &NoMedia).await.unwrap();

    let patched = outcome.patched_text.unwrap();
    let directive_len = "cards-deck: Default\n".len();
    let marker_len = " ^1720000000000".len();
    // The third card's content originally ended at offset 33; its marker must
    // land there shifted by the directive and the two earlier markers.
    let expected_at = 33 + directive_len + 2 * marker_len;
    assert_eq!(
        &patched[expected_at..expected_at + marker_len],
        " ^1720000000002"
    );
}

#[tokio::test]
async fn removed_marker_triggers_remote_deletion() {
    let kept_a = FIRST_ID + 100;
    let gone_b = FIRST_ID + 101;
    let kept_c = FIRST_ID + 102;
    let store = MockStore::with_notes(vec![
        record(kept_a, "Default", ["qa", "aa"], &[]),
        record(gone_b, "Default", ["qb", "ab"], &[]),
        record(kept_c, "Default", ["qc", "ac"], &[]),
    ]);

    let text = format!("qa :: aa ^{kept_a}\nqc :: ac ^{kept_c}\n");
    let outcome = engine().sync(note(&text), &store, &NoMedia).await.unwrap();

    assert_eq!(outcome.stats.deleted, 1);
    assert!(outcome
        .notifications
        .contains(&"Deleted successfully 1 cards.".to_string()));
    assert_eq!(store.ops(), vec!["delete:1".to_string()]);
    assert!(store
        .notes
        .lock()
        .unwrap()
        .iter()
        .all(|n| n.note_id != gone_b));
}

#[tokio::test]
async fn dangling_identifier_is_warned_never_recreated() {
    let store = MockStore::new();
    let text = "q :: a ^1720000000404\n";
    let outcome = engine().sync(note(text), &store, &NoMedia).await.unwrap();

    assert_eq!(
        outcome.notifications,
        vec!["Error: Card with ID 1720000000404 is not in Anki!"]
    );
    assert!(store.ops().is_empty());
    assert_eq!(outcome.patched_text, None);
}

#[tokio::test]
async fn tag_drift_alone_is_pushed_as_update() {
    let id = FIRST_ID + 200;
    let store = MockStore::with_notes(vec![record(id, "Default", ["q", "a"], &["stale"])]);
    let text = format!("q :: a ^{id}\n");
    let outcome = engine().sync(note(&text), &store, &NoMedia).await.unwrap();

    assert_eq!(outcome.stats.updated, 1);
    assert!(outcome
        .notifications
        .contains(&"Updated successfully 1 cards.".to_string()));
    assert_eq!(store.ops(), vec!["update:1".to_string()]);
    assert!(store.notes.lock().unwrap()[0].tags.is_empty());
}

#[tokio::test]
async fn declared_deck_change_moves_remote_cards() {
    let id = FIRST_ID + 300;
    let store = MockStore::with_notes(vec![record(id, "Old", ["q", "a"], &[])]);
    let text = format!("---\ncards-deck: New\n---\nq :: a ^{id}\n");
    let sync_engine = engine();

    let outcome = sync_engine.sync(note(&text), &store, &NoMedia).await.unwrap();

    assert_eq!(outcome.stats.moved, 1);
    assert_eq!(
        outcome.notifications,
        vec!["Moved 1 cards from \"Old\" to \"New\"".to_string()]
    );
    assert_eq!(store.ops(), vec!["move:1:New".to_string()]);

    // The move converged: a second run finds nothing to do.
    let second = sync_engine.sync(note(&text), &store, &NoMedia).await.unwrap();
    assert_eq!(
        second.notifications,
        vec!["Nothing to do. Everything is up to date"]
    );
}

#[tokio::test]
async fn delete_failure_is_reported_but_not_fatal() {
    let id = FIRST_ID + 500;
    let mut store = MockStore::with_notes(vec![record(id, "Default", ["q", "a"], &[])]);
    store.fail_deletes = true;

    let outcome = engine()
        .sync(note("no cards anymore\n"), &store, &NoMedia)
        .await
        .unwrap();

    assert_eq!(
        outcome.notifications,
        vec!["Error: Could not delete cards from Anki"]
    );
    assert_eq!(outcome.stats.deleted, 0);
}

#[tokio::test]
async fn media_is_encoded_and_stored_every_run() {
    let text = "##### Diagram\n#card\nsee ![[img.png]]\n";
    let store = MockStore::new();
    let outcome = engine()
        .sync(note(text), &store, &FixedMedia(b"PNG"))
        .await
        .unwrap();

    let ops = store.ops();
    assert_eq!(ops[0], "media:img.png:UE5H");
    assert_eq!(ops[1], "create:1");
    assert_eq!(outcome.stats.created, 1);
}

#[tokio::test]
async fn media_read_failure_aborts_before_any_mutation() {
    let text = "##### Diagram\n#card\nsee ![[img.png]]\n";
    let store = MockStore::new();
    let err = engine()
        .sync(note(text), &store, &BrokenMedia)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::MediaRead { name } if name == "img.png"));
    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn inline_example_end_to_end() {
    let text = "##### Q\n#card A::B\n";
    let store = MockStore::new();
    let outcome = engine().sync(note(text), &store, &NoMedia).await.unwrap();

    assert_eq!(outcome.stats.created, 1);
    let patched = outcome.patched_text.unwrap();
    assert_eq!(patched, format!("##### Q\n#card A::B ^{FIRST_ID}\n"));
}
