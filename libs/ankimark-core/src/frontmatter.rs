//! Front-block handling: the leading metadata section delimited by `---`
//! lines, the `cards-deck:` directive and the global tag line.
//!
//! Card matching must never look inside the front-block; the matcher asks for
//! the block's span and discards matches positionally instead of relying on
//! pattern lookarounds.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static DECK_DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^cards-deck:[ \t]*(.+?)[ \t]*$").expect("deck directive regex"));

static GLOBAL_TAGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^(?:cards-)?tags:[ \t]*(.*)$").expect("global tags regex"));

static TAG_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#?(?:\[\[[^\]\n]+\]\]|[\p{L}\p{N}/_-]+)").expect("tag token regex"));

/// The leading front-block of a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontBlock {
    /// Byte span of the whole block, both delimiter lines included.
    pub span: Range<usize>,
    /// Byte offset of the closing `---` line.
    pub close_start: usize,
}

/// Locate the leading front-block: the note must start with a line of exactly
/// three hyphens, closed by the next such line.
pub fn front_block(text: &str) -> Option<FrontBlock> {
    let mut lines = line_spans(text);
    let (start, _, first) = lines.next()?;
    if start != 0 || first.trim_end_matches('\r') != "---" {
        return None;
    }
    for (line_start, line_end, line) in lines {
        if line.trim_end_matches('\r') == "---" {
            return Some(FrontBlock {
                span: 0..line_end,
                close_start: line_start,
            });
        }
    }
    None
}

/// Span of the leading front-block, if any.
pub fn front_block_span(text: &str) -> Option<Range<usize>> {
    front_block(text).map(|block| block.span)
}

/// Deck name declared via `cards-deck:` inside the front-block.
pub fn declared_deck(text: &str) -> Option<String> {
    let span = front_block_span(text)?;
    DECK_DIRECTIVE_RE
        .captures(&text[span])
        .map(|caps| caps[1].to_string())
}

/// Raw tag tokens from the first `tags:` / `cards-tags:` metadata line.
/// Tokens keep their `#` and wiki-link brackets; normalization is the
/// builder's job.
pub fn global_tags(text: &str) -> Vec<String> {
    let Some(caps) = GLOBAL_TAGS_RE.captures(text) else {
        return Vec::new();
    };
    TAG_TOKEN_RE
        .find_iter(&caps[1])
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Splice a `cards-deck:` line immediately before the front-block's closing
/// delimiter. Returns the new text and the inserted length, or `None` when
/// the note has no front-block or already declares a deck.
pub fn insert_deck_directive(text: &str, deck: &str) -> Option<(String, usize)> {
    let block = front_block(text)?;
    if DECK_DIRECTIVE_RE.is_match(&text[block.span.clone()]) {
        return None;
    }
    let line = format!("cards-deck: {deck}\n");
    let mut out = String::with_capacity(text.len() + line.len());
    out.push_str(&text[..block.close_start]);
    out.push_str(&line);
    out.push_str(&text[block.close_start..]);
    let inserted = line.len();
    Some((out, inserted))
}

/// Lines with their byte spans: `(start, end_including_newline, content)`.
fn line_spans(text: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    let mut pos = 0usize;
    text.split_inclusive('\n').map(move |line| {
        let start = pos;
        pos += line.len();
        (start, pos, line.strip_suffix('\n').unwrap_or(line))
    })
}
