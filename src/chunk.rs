//! Recursive boundary-seeking text splitter.
//!
//! Splits document text into pieces of at most `max_chars` characters,
//! preferring to break at paragraph boundaries, then lines, then sentence
//! ends, then clause commas, in that order. When no separator produces
//! small-enough pieces the splitter falls back to a hard character cut.
//!
//! Separators stay attached to the piece they terminate, so concatenating
//! the returned pieces reproduces the input text exactly. The splitter is
//! a pure function of its inputs.

use crate::models::{ChunkRecord, Document};

/// Boundary ladder, highest priority first: paragraph, line, sentence,
/// clause.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", ".", ","];

/// Split `text` into pieces of at most `max_chars` characters each,
/// breaking at the highest-priority separator that fits.
pub fn split_text(text: &str, max_chars: usize, separators: &[&str]) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    split_recursive(text, max_chars, separators, &mut pieces);
    pieces
}

/// Split a document's text and wrap each non-blank piece in a
/// [`ChunkRecord`] carrying the document's source URL.
pub fn chunk_document(doc: &Document, max_chars: usize) -> Vec<ChunkRecord> {
    split_text(&doc.text, max_chars, &DEFAULT_SEPARATORS)
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .enumerate()
        .map(|(seq, piece)| ChunkRecord::new(seq as i64, piece, doc.source.clone()))
        .collect()
}

fn split_recursive(text: &str, max_chars: usize, separators: &[&str], out: &mut Vec<String>) {
    if char_len(text) <= max_chars {
        out.push(text.to_string());
        return;
    }

    let Some((sep, rest)) = separators.split_first() else {
        hard_cut(text, max_chars, out);
        return;
    };

    let parts = split_keep_separator(text, sep);
    if parts.len() == 1 {
        // Separator absent; try the next one down the ladder.
        split_recursive(text, max_chars, rest, out);
        return;
    }

    // Greedily pack consecutive parts into pieces up to max_chars.
    let mut buf = String::new();
    let mut buf_len = 0usize;

    for part in parts {
        let part_len = char_len(part);

        if part_len > max_chars {
            if !buf.is_empty() {
                out.push(std::mem::take(&mut buf));
                buf_len = 0;
            }
            split_recursive(part, max_chars, rest, out);
            continue;
        }

        if buf_len + part_len > max_chars && !buf.is_empty() {
            out.push(std::mem::take(&mut buf));
            buf_len = 0;
        }

        buf.push_str(part);
        buf_len += part_len;
    }

    if !buf.is_empty() {
        out.push(buf);
    }
}

/// Split on `sep`, keeping each separator attached to the part it ends.
fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;

    for (idx, matched) in text.match_indices(sep) {
        let end = idx + matched.len();
        parts.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        parts.push(&text[start..]);
    }

    parts
}

/// Last resort: cut every `max_chars` characters on UTF-8 boundaries.
fn hard_cut(text: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        out.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
