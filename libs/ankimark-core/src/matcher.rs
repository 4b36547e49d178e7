//! Pattern rules that locate card-shaped spans in note text.
//!
//! Two styles are recognized: block cards (question line, `#card` tag line,
//! multi-line answer) and inline cards (question and answer on one line,
//! separated by a configurable token). Matches carry byte positions into the
//! original text; everything downstream works in offsets relative to that
//! snapshot.
//!
//! Spans inside the leading front-block are discarded by position after
//! matching. The regex engine has no lookaround, and a positional pass is the
//! robust way to keep metadata lines (which may contain separator-like tokens
//! or identifier-like numbers) out of the card set.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::frontmatter;
use crate::types::{CardStyle, SyncSettings};

/// Identifier markers: a caret followed by a digit run. Only 13-digit runs
/// count as markers; the length check happens after capture so that longer
/// runs are rejected instead of truncated.
static ID_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\^(\d+)").expect("id marker regex"));

/// A whole line holding nothing but an identifier marker.
static ID_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\^(\d{13})$").expect("id line regex"));

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}#{1,6}[ \t]").expect("heading regex"));

static HEADING_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}#{1,6}[ \t]+").expect("heading strip regex"));

static TAG_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#[\p{L}\p{N}/_-]+").expect("tag token regex"));

const ID_DIGITS: usize = 13;

/// One raw match produced by a pattern rule. Positions refer to the original
/// text; `end_offset` is where a marker would be inserted (or ends, when one
/// was already present).
#[derive(Debug, Clone)]
pub struct RawMatch {
    pub style: CardStyle,
    pub span: Range<usize>,
    pub question: String,
    pub answer: String,
    /// Raw `#tag` tokens trailing the card marker; normalization happens in
    /// the builder.
    pub tags: Vec<String>,
    pub reversed: bool,
    pub id: Option<i64>,
    pub end_offset: usize,
}

/// Compiled pattern rules for the enabled card styles. Separator and tag
/// tokens come from settings, so the patterns are built per configuration
/// rather than held in statics.
pub struct CardPatterns {
    block_header: Regex,
    block_tag_line: Regex,
    inline: Regex,
    reverse_separator: String,
}

impl CardPatterns {
    pub fn new(settings: &SyncSettings) -> Self {
        let tag = regex::escape(&settings.flashcards_tag);
        let block_header = Regex::new(&format!(
            r"(?m)^(?P<question>[^\n]+)\n[ \t]*#{tag}(?P<rev>[-/]reverse)?(?P<tags>(?:[ \t]+#[\p{{L}}\p{{N}}/_-]+)*)[ \t]*$"
        ))
        .expect("block header pattern");
        let block_tag_line = Regex::new(&format!(
            r"^#{tag}(?:[-/]reverse)?(?:[ \t]+#[\p{{L}}\p{{N}}/_-]+)*$"
        ))
        .expect("block tag line pattern");

        let sep = regex::escape(&settings.inline_separator);
        let rev = regex::escape(&settings.inline_separator_reverse);
        // Longest alternative first so ":::" is not consumed as "::".
        let (first, second) = if settings.inline_separator_reverse.len() >= settings.inline_separator.len() {
            (rev, sep)
        } else {
            (sep, rev)
        };
        let inline = Regex::new(&format!(
            r"(?m)^(?:[ \t]*(?:#{{1,6}}[ \t]+|[-+*][ \t]+|\d+[.)][ \t]+))?(?P<q>[^\n]+?)[ \t]*(?P<sep>{first}|{second})[ \t]*(?P<a>[^\n]+?)(?P<tags>(?:[ \t]+#[\p{{L}}\p{{N}}/_-]+)*)(?:[ \t]+\^(?P<id>\d{{13}}))?[ \t]*$"
        ))
        .expect("inline card pattern");

        Self {
            block_header,
            block_tag_line,
            inline,
            reverse_separator: settings.inline_separator_reverse.clone(),
        }
    }

    /// All card matches in `text`, in ascending span order, front-block spans
    /// excluded, overlaps resolved (earlier start wins; block style wins a
    /// tie at the same start).
    pub fn scan(&self, text: &str) -> Vec<RawMatch> {
        let mut matches = self.scan_block(text);
        matches.extend(self.scan_inline(text));

        if let Some(front) = frontmatter::front_block_span(text) {
            matches.retain(|m| !front.contains(&m.span.start));
        }

        matches.sort_by_key(|m| (m.span.start, style_rank(m.style)));
        let mut kept: Vec<RawMatch> = Vec::new();
        for m in matches {
            let overlaps = kept
                .last()
                .is_some_and(|prev| m.span.start < prev.span.end);
            if !overlaps {
                kept.push(m);
            }
        }
        kept
    }

    /// Every identifier marker embedded in the text outside the front-block,
    /// in encounter order. This is the reference set for deletion detection:
    /// a marker protects its remote note even when the surrounding card no
    /// longer parses.
    pub fn embedded_ids(text: &str) -> Vec<i64> {
        let front = frontmatter::front_block_span(text);
        ID_MARKER_RE
            .captures_iter(text)
            .filter(|caps| {
                let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                front.as_ref().map_or(true, |f| !f.contains(&start))
            })
            .filter(|caps| caps[1].len() == ID_DIGITS)
            .filter_map(|caps| caps[1].parse::<i64>().ok())
            .collect()
    }

    fn scan_block(&self, text: &str) -> Vec<RawMatch> {
        let mut out = Vec::new();
        for caps in self.block_header.captures_iter(text) {
            let whole = caps.get(0).expect("whole match");
            let question_raw = &caps["question"];
            let question = HEADING_STRIP_RE.replace(question_raw, "").trim().to_string();
            if question.is_empty() {
                continue;
            }
            if whole.end() >= text.len() {
                continue;
            }
            let body_start = whole.end() + 1;

            let (content_end, found_id) = self.block_answer_extent(text, body_start);
            let Some(content_end) = content_end else { continue };
            let answer = text[body_start..content_end].trim().to_string();
            if answer.is_empty() {
                continue;
            }

            let (id, end_offset) = match found_id {
                Some((id, id_end)) => (Some(id), id_end),
                None => (None, content_end),
            };

            out.push(RawMatch {
                style: CardStyle::Block,
                span: whole.start()..end_offset,
                question,
                answer,
                tags: tag_tokens(caps.name("tags").map(|m| m.as_str()).unwrap_or("")),
                reversed: caps.name("rev").is_some(),
                id,
                end_offset,
            });
        }
        out
    }

    /// Walk lines from `body_start` until the answer ends: at an identifier
    /// line (captured), at a heading or another card's marker lines, or at
    /// end of text. Returns the offset just past the last non-blank answer
    /// line, and the identifier with its end offset when one terminated the
    /// walk.
    fn block_answer_extent(
        &self,
        text: &str,
        body_start: usize,
    ) -> (Option<usize>, Option<(i64, usize)>) {
        let mut content_end: Option<usize> = None;
        let mut pos = body_start;
        let mut after_blank = false;
        while pos < text.len() {
            let line_end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
            let line = &text[pos..line_end];
            let trimmed = line.trim();

            if let Some(id_caps) = ID_LINE_RE.captures(trimmed) {
                let Ok(id) = id_caps[1].parse::<i64>() else { break };
                return (content_end, Some((id, pos + line.trim_end().len())));
            }

            if trimmed.is_empty() {
                after_blank = true;
            } else {
                if HEADING_RE.is_match(line) || self.block_tag_line.is_match(trimmed) {
                    break;
                }
                // A paragraph opening with an inline card starts new material.
                if after_blank && self.inline.is_match(line) {
                    break;
                }
                // A line sitting directly above a tag line opens the next card.
                let next_start = line_end + 1;
                if next_start < text.len() {
                    let next_end = text[next_start..]
                        .find('\n')
                        .map_or(text.len(), |i| next_start + i);
                    if self.block_tag_line.is_match(text[next_start..next_end].trim()) {
                        break;
                    }
                }
                content_end = Some(pos + line.trim_end().len());
                after_blank = false;
            }

            if line_end >= text.len() {
                break;
            }
            pos = line_end + 1;
        }
        (content_end, None)
    }

    fn scan_inline(&self, text: &str) -> Vec<RawMatch> {
        let mut out = Vec::new();
        for caps in self.inline.captures_iter(text) {
            let whole = caps.get(0).expect("whole match");
            let question = caps["q"].trim().to_string();
            let answer = caps["a"].trim().to_string();
            if question.is_empty() || answer.is_empty() {
                continue;
            }

            let tags_group = caps.name("tags");
            let mut id = caps
                .name("id")
                .and_then(|m| m.as_str().parse::<i64>().ok());
            let mut end_offset = if let Some(id_match) = caps.name("id") {
                id_match.end()
            } else if let Some(tags) = tags_group.filter(|m| !m.is_empty()) {
                tags.end()
            } else {
                caps.name("a").expect("answer group").end()
            };
            let mut span_end = whole.end();

            // The marker may sit alone on the following line instead.
            if id.is_none() {
                if let Some((next_id, next_end)) = id_on_next_line(text, whole.end()) {
                    id = Some(next_id);
                    end_offset = next_end;
                    span_end = next_end;
                }
            }

            out.push(RawMatch {
                style: CardStyle::Inline,
                span: whole.start()..span_end.max(end_offset),
                question,
                answer,
                tags: tag_tokens(tags_group.map(|m| m.as_str()).unwrap_or("")),
                reversed: &caps["sep"] == self.reverse_separator.as_str(),
                id,
                end_offset,
            });
        }
        out
    }
}

fn style_rank(style: CardStyle) -> u8 {
    match style {
        CardStyle::Block => 0,
        CardStyle::Inline => 1,
    }
}

fn tag_tokens(group: &str) -> Vec<String> {
    TAG_TOKEN_RE
        .find_iter(group)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Identifier alone on the line starting at `line_break` (which must point at
/// a newline). Returns the id and the offset just past its digits.
fn id_on_next_line(text: &str, line_break: usize) -> Option<(i64, usize)> {
    if !text[line_break..].starts_with('\n') {
        return None;
    }
    let start = line_break + 1;
    let end = text[start..].find('\n').map_or(text.len(), |i| start + i);
    let line = &text[start..end];
    let caps = ID_LINE_RE.captures(line.trim())?;
    let id = caps[1].parse::<i64>().ok()?;
    Some((id, start + line.trim_end().len()))
}
