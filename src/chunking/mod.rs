//! Document chunking
//!
//! Splits raw document text into overlapping segments sized for embedding,
//! preferring sentence and word boundaries over hard cuts.

use serde::{Deserialize, Serialize};

/// Configuration for the chunker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between neighboring chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Fraction of the window after which a sentence terminator is accepted
const SENTENCE_BREAK_FRACTION: f64 = 0.7;
/// Fraction of the window after which a whitespace break is accepted
const WORD_BREAK_FRACTION: f64 = 0.8;

/// Split `text` into overlapping chunks at most `chunk_size` characters long.
///
/// Boundary policy per window: prefer the last sentence terminator (`.`, `!`,
/// `?`) falling after 70% of the window, else the last whitespace after 80%,
/// else a hard cut at `chunk_size`. The next window starts `overlap`
/// characters before the previous window's actual end, so no content is
/// dropped. Deterministic and side-effect-free.
///
/// Sizes are measured in characters, not bytes, so multi-byte input cannot
/// split a code point.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(chunk_size > 0, "chunk_size must be positive");
    debug_assert!(overlap < chunk_size, "overlap must be below chunk_size");

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let window_end = (start + chunk_size).min(chars.len());
        let end = if window_end == chars.len() {
            window_end
        } else {
            snap_boundary(&chars, start, window_end)
        };

        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }

        if end >= chars.len() {
            break;
        }

        // Overlap is taken from the actual (possibly snapped) end; the guard
        // keeps the walk advancing even for tiny windows.
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    if chunks.is_empty() {
        chunks.push(text.to_string());
    }

    chunks
}

/// Find the break position for the window `[start, window_end)`.
fn snap_boundary(chars: &[char], start: usize, window_end: usize) -> usize {
    let window = window_end - start;
    let sentence_floor = start + (window as f64 * SENTENCE_BREAK_FRACTION) as usize;
    let word_floor = start + (window as f64 * WORD_BREAK_FRACTION) as usize;

    let mut last_sentence = None;
    let mut last_space = None;
    for (i, &c) in chars[start..window_end].iter().enumerate() {
        let pos = start + i;
        if matches!(c, '.' | '!' | '?') {
            last_sentence = Some(pos + 1);
        } else if c.is_whitespace() {
            last_space = Some(pos + 1);
        }
    }

    if let Some(pos) = last_sentence {
        if pos > sentence_floor {
            return pos;
        }
    }
    if let Some(pos) = last_space {
        if pos > word_floor {
            return pos;
        }
    }
    window_end
}
