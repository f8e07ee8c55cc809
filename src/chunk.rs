//! Overlapping window text chunker.
//!
//! Splits a corpus source file into [`Chunk`]s of at most `chunk_size`
//! tokens, with `chunk_overlap` tokens repeated at the start of each
//! following chunk so facts straddling a boundary stay retrievable.
//!
//! # Algorithm
//!
//! 1. Convert token counts to characters using a 4 chars/token ratio.
//! 2. Take a window of `max_chars` starting at the current position.
//! 3. If the window does not reach the end of the text, pull its end back
//!    to the last newline or space inside it (hard cut if there is none).
//! 4. Emit the trimmed window as a chunk.
//! 5. Start the next window `overlap_chars` before the previous end,
//!    moved forward to the next word start, and always past the previous
//!    start.
//!
//! All cut points are snapped to UTF-8 character boundaries.
//!
//! # Example
//!
//! ```rust
//! use artist_rag::chunk::chunk_text;
//!
//! let chunks = chunk_text("Biografia: cantora.\n\nÁlbuns: Fearless (2008)", 256, 30);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into overlapping chunks.
///
/// Returns chunks with contiguous indices starting at 0. Whitespace-only
/// input yields no chunks. `chunk_overlap` must be smaller than
/// `chunk_size`; larger values are clamped to `chunk_size - 1`.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let max_chars = chunk_size.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = chunk_overlap.min(chunk_size.saturating_sub(1)) * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut start = skip_whitespace(text, 0);

    while start < text.len() {
        let end = window_end(text, start, max_chars);
        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(chunks.len() as i64, piece));
        }
        if end >= text.len() {
            break;
        }

        let next = next_start(text, start, end, overlap_chars);
        start = skip_whitespace(text, next);
    }

    chunks
}

/// End (exclusive) of the window starting at `start`.
fn window_end(text: &str, start: usize, max_chars: usize) -> usize {
    let hard_end = snap_to_char_boundary(text, start.saturating_add(max_chars));
    if hard_end >= text.len() {
        return text.len();
    }

    let window = &text[start..hard_end];
    let soft = window
        .rfind('\n')
        .or_else(|| window.rfind(' '))
        .map(|pos| start + pos + 1)
        .filter(|&pos| pos > start);

    match soft {
        Some(pos) => pos,
        // No break point: hard cut, but always consume at least one char
        None if hard_end > start => hard_end,
        None => next_char_boundary(text, start),
    }
}

/// Start of the window following `[start, end)`.
fn next_start(text: &str, start: usize, end: usize, overlap_chars: usize) -> usize {
    if overlap_chars == 0 {
        return end;
    }
    let candidate = snap_to_char_boundary(text, end.saturating_sub(overlap_chars));
    // Move forward to a word start so overlaps do not begin mid-word
    let candidate = match text[candidate..end].find(char::is_whitespace) {
        Some(pos) if candidate > 0 && !is_word_start(text, candidate) => candidate + pos,
        _ => candidate,
    };
    if candidate <= start {
        end
    } else {
        candidate
    }
}

fn is_word_start(text: &str, index: usize) -> bool {
    text[..index]
        .chars()
        .next_back()
        .map(char::is_whitespace)
        .unwrap_or(true)
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

fn next_char_boundary(text: &str, index: usize) -> usize {
    text[index..]
        .char_indices()
        .nth(1)
        .map(|(i, _)| index + i)
        .unwrap_or(text.len())
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
