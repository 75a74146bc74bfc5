//! Line-addressed overlapping chunker with a deterministic token heuristic.
//!
//! Splitting never uses a real tokenizer: the token count of a word is
//! `ceil(len/4)`, summed over whitespace-delimited words. The heuristic is
//! exact and reproducible, so chunk boundaries and hashes are stable across
//! runs, which is what the change-aware indexer relies on.

use serde::{Deserialize, Serialize};

use crate::hash::content_hash;

/// Default approximate token budget per chunk.
pub const DEFAULT_CHUNK_SIZE_TOKENS: usize = 400;
/// Default approximate token overlap seeded into the next chunk.
pub const DEFAULT_OVERLAP_TOKENS: usize = 80;

/// A contiguous line-range slice of a document, the atomic unit of retrieval.
///
/// # Examples
///
/// ```
/// use recall_engine::chunker::chunk_text;
///
/// let chunks = chunk_text("alpha beta\ngamma", 400, 80);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].start_line, 1);
/// assert_eq!(chunks[0].end_line, 2);
/// assert_eq!(chunks[0].text, "alpha beta\ngamma");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// The exact chunk text (lines joined with `\n`).
    pub text: String,
    /// First line of the chunk (1-based, inclusive).
    pub start_line: u32,
    /// Last line of the chunk (1-based, inclusive).
    pub end_line: u32,
    /// SHA-256 of `text`, used for deduplication.
    pub hash: String,
}

/// Estimate the token count of `text`: `ceil(len(word)/4)` summed over
/// whitespace-delimited words.
///
/// # Examples
///
/// ```
/// use recall_engine::chunker::token_estimate;
///
/// assert_eq!(token_estimate(""), 0);
/// assert_eq!(token_estimate("abcd"), 1);
/// assert_eq!(token_estimate("abcde"), 2);
/// assert_eq!(token_estimate("one two three"), 3);
/// ```
pub fn token_estimate(text: &str) -> usize {
    text.split_whitespace().map(|w| (w.len() + 3) / 4).sum()
}

/// Split `text` into overlapping, line-addressed chunks.
///
/// Lines accumulate until adding the next line would exceed
/// `chunk_size_tokens`; the chunk is then closed and the next one is seeded
/// with however many trailing lines of the closed chunk sum to at least
/// `overlap_tokens`, walked backward from the end. Lines are never split, so
/// a chunk can overshoot the budget by at most one line.
///
/// Empty or whitespace-only input yields an empty sequence; a trailing
/// whitespace-only buffer is dropped rather than flushed.
///
/// # Examples
///
/// ```
/// use recall_engine::chunker::chunk_text;
///
/// assert!(chunk_text("", 400, 80).is_empty());
/// assert!(chunk_text("   \n\t\n", 400, 80).is_empty());
///
/// let chunks = chunk_text("short note", 400, 80);
/// assert_eq!(chunks.len(), 1);
/// ```
pub fn chunk_text(text: &str, chunk_size_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buf: Vec<(u32, &str)> = Vec::new();
    let mut tokens = 0usize;

    for (i, line) in text.lines().enumerate() {
        let line_no = i as u32 + 1;
        let line_tokens = token_estimate(line);

        if !buf.is_empty() && tokens + line_tokens > chunk_size_tokens {
            flush(&mut chunks, &buf);

            // Seed the next chunk with the tail of the one just closed.
            let mut seed: Vec<(u32, &str)> = Vec::new();
            let mut seed_tokens = 0usize;
            if overlap_tokens > 0 {
                for &(no, tail_line) in buf.iter().rev() {
                    if seed_tokens >= overlap_tokens {
                        break;
                    }
                    seed.push((no, tail_line));
                    seed_tokens += token_estimate(tail_line);
                }
                seed.reverse();
            }
            buf = seed;
            tokens = seed_tokens;
        }

        buf.push((line_no, line));
        tokens += line_tokens;
    }

    flush(&mut chunks, &buf);
    chunks
}

/// Close the buffered lines into a chunk, dropping all-whitespace buffers.
fn flush(chunks: &mut Vec<Chunk>, buf: &[(u32, &str)]) {
    let Some(&(start_line, _)) = buf.first() else {
        return;
    };
    let end_line = buf.last().map(|&(no, _)| no).unwrap_or(start_line);

    let text: String = buf
        .iter()
        .map(|&(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        return;
    }

    let hash = content_hash(&text);
    chunks.push(Chunk {
        text,
        start_line,
        end_line,
        hash,
    });
}
