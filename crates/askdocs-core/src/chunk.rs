//! Overlapping character-window text chunker.
//!
//! Splits extracted document text into [`Chunk`]s of at most `chunk_size`
//! characters, where every chunk after the first starts exactly
//! `chunk_overlap` characters before the end of its predecessor. Adjacent
//! chunks therefore share boundary context and no character is ever skipped.
//!
//! Each chunk records its `start_offset` (in characters) in the extracted
//! text, a random UUID, and a SHA-256 hash of its text.
//!
//! # Algorithm
//!
//! 1. If the remaining text fits in `chunk_size` characters, emit it as the
//!    final chunk.
//! 2. Otherwise look for a boundary inside the back half of the window, in
//!    order of preference: paragraph (`\n\n`), line (`\n`), sentence
//!    (`. `, `! `, `? `), word (` `). The chunk ends right after the
//!    separator of the last such boundary.
//! 3. Without a usable boundary, cut at exactly `chunk_size` characters.
//! 4. The next chunk starts `chunk_overlap` characters before that end.
//!
//! A boundary is only usable if it leaves the chunk longer than the overlap,
//! so each step advances by at least one character.
//!
//! # Example
//!
//! ```rust
//! use askdocs_core::chunk::chunk_text;
//!
//! let text = "x".repeat(700);
//! let chunks = chunk_text("notes.txt", &text, 300, 100);
//! let starts: Vec<i64> = chunks.iter().map(|c| c.start_offset).collect();
//! assert_eq!(starts, vec![0, 200, 400]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Default chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 300;
/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Boundary separators, most preferred first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// Split `text` into overlapping chunks.
///
/// `chunk_size` is clamped to at least 1 and `chunk_overlap` to at most
/// `chunk_size - 1`; configuration loading rejects such values earlier, the
/// clamp only keeps the loop finite.
///
/// # Guarantees
///
/// - Empty or whitespace-only text yields no chunks.
/// - Text of at most `chunk_size` characters yields one chunk equal to it.
/// - Every chunk has at most `chunk_size` characters.
/// - Chunk `i + 1` starts exactly `chunk_overlap` characters before the end
///   of chunk `i`.
/// - Dropping the first `chunk_overlap` characters of every chunk but the
///   first and concatenating reconstructs `text`.
pub fn chunk_text(source: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let size = chunk_size.max(1);
    let overlap = chunk_overlap.min(size - 1);

    // Byte offset of every char, plus the end of the string, so windows can
    // be expressed in characters and sliced in bytes.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    let total_chars = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0i64;

    loop {
        if total_chars - start <= size {
            chunks.push(make_chunk(source, index, start, &text[bounds[start]..]));
            break;
        }

        let hard_end = start + size;
        let min_end = start + overlap.max(size / 2) + 1;
        let end = find_boundary(text, &bounds, min_end, hard_end).unwrap_or(hard_end);

        chunks.push(make_chunk(
            source,
            index,
            start,
            &text[bounds[start]..bounds[end]],
        ));
        index += 1;
        start = end - overlap;
    }

    chunks
}

/// Find the preferred chunk end (in chars) within `[min_end, max_end]`.
///
/// Returns the position right after the last occurrence of the most
/// preferred separator that fits in the window.
fn find_boundary(text: &str, bounds: &[usize], min_end: usize, max_end: usize) -> Option<usize> {
    if min_end > max_end {
        return None;
    }
    // Start one char early so a separator ending exactly at `min_end` counts.
    let window_start_byte = bounds[min_end.saturating_sub(1)];
    let window = &text[window_start_byte..bounds[max_end]];

    for sep in SEPARATORS {
        let Some(pos) = window.rfind(sep) else {
            continue;
        };
        let end_byte = window_start_byte + pos + sep.len();
        // `end_byte` always lands on a char boundary; map it back to chars.
        if let Ok(end_char) = bounds.binary_search(&end_byte) {
            if end_char >= min_end && end_char <= max_end {
                return Some(end_char);
            }
        }
    }
    None
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(source: &str, index: i64, start_char: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        start_offset: start_char as i64,
        text: text.to_string(),
        hash,
        upload_id: None,
        uploaded_at: 0,
    }
}

/// Rebuild the original text from chunks produced by [`chunk_text`].
///
/// Each chunk after the first contributes only the characters past the
/// region it shares with its predecessor.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        let start = chunk.start_offset as usize;
        let skip = covered.saturating_sub(start);
        out.extend(chunk.text.chars().skip(skip));
        covered = start + chunk.char_len();
    }
    out
}
