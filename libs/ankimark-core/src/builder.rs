//! Converts raw matches into typed [`Card`] records.

use std::sync::LazyLock;

use regex::Regex;

use crate::matcher::RawMatch;
use crate::types::Card;

/// Embedded media references: `![[name]]`, optionally with a display
/// modifier after `|`.
static MEDIA_EMBED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[\[([^\]\n]+?)\]\]").expect("media embed regex"));

static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]\n]*)\]\]").expect("wikilink regex"));

/// Build one card per raw match, attaching deck, origin metadata, merged
/// tags and media references. `global_tags` come first, per-card tags after,
/// all normalized; duplicates are kept.
pub fn build_cards(
    text: &str,
    matches: &[RawMatch],
    deck_name: &str,
    vault_name: &str,
    source_path: &str,
    global_tags: &[String],
) -> Vec<Card> {
    matches
        .iter()
        .map(|m| {
            let mut tags: Vec<String> = Vec::with_capacity(global_tags.len() + m.tags.len());
            for raw in global_tags.iter().chain(m.tags.iter()) {
                let tag = normalize_tag(raw);
                if !tag.is_empty() {
                    tags.push(tag);
                }
            }

            let mut media_names = extract_media(&m.question);
            media_names.extend(extract_media(&m.answer));

            Card {
                style: m.style,
                question: m.question.clone(),
                answer: m.answer.clone(),
                original_content: text[m.span.clone()].to_string(),
                deck_name: deck_name.to_string(),
                vault_name: vault_name.to_string(),
                source_path: source_path.to_string(),
                tags,
                id: m.id,
                inserted: m.id.is_some(),
                end_offset: m.end_offset,
                old_tags: None,
                reversed: m.reversed,
                media_names,
                media_base64: Vec::new(),
            }
        })
        .collect()
}

/// Tag normalization: strip the leading `#`, collapse wiki-link brackets to
/// their inner text, turn `/` path segments into the store's `::` namespacing
/// separator, trim, and replace internal spaces with hyphens.
pub fn normalize_tag(raw: &str) -> String {
    let stripped = raw.trim().trim_start_matches('#');
    let unlinked = WIKILINK_RE.replace(stripped, "$1");
    unlinked.replace('/', "::").trim().replace(' ', "-")
}

/// Media names embedded in a card slice, in encounter order. Display
/// modifiers (`![[img.png|300]]`) are not part of the name.
fn extract_media(content: &str) -> Vec<String> {
    MEDIA_EMBED_RE
        .captures_iter(content)
        .filter_map(|caps| caps[1].split('|').next().map(|name| name.trim().to_string()))
        .filter(|name| !name.is_empty())
        .collect()
}
