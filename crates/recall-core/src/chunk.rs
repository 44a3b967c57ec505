//! Paragraph-then-sentence text chunker.
//!
//! Splits long bodies into bounded, order-preserving pieces that respect a
//! `max_chunk_size` limit measured in characters.
//!
//! # Algorithm
//!
//! 1. Split text on blank-line paragraph boundaries.
//! 2. Accumulate paragraphs into a buffer (joined by `\n\n`) until adding
//!    the next one would exceed `max_chunk_size`; then flush the buffer as
//!    a chunk and start a new one.
//! 3. A paragraph that alone exceeds the limit flushes the buffer and is
//!    split on sentence terminators (`.`, `!`, `?`); sentences are packed
//!    with the same fill/flush rule (joined by a space).
//! 4. A single sentence longer than the limit is emitted whole, never cut
//!    mid-sentence.
//! 5. Any non-empty remainder is flushed as the final chunk.
//!
//! Trivial chunks are not dropped here; ingestion filters them with
//! [`is_trivial_chunk`].
//!
//! # Example
//!
//! ```rust
//! use recall_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", 1000);
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Chunks whose trimmed length is below this are not worth indexing.
pub const MIN_CHUNK_CHARS: usize = 50;

const PARAGRAPH_SEP: &str = "\n\n";
const SENTENCE_SEP: &str = " ";

/// Split text into chunks of at most `max_chunk_size` characters.
///
/// The only chunks allowed to exceed the limit are single sentences that
/// are themselves longer than it. Empty or whitespace-only input yields
/// no chunks. A `max_chunk_size` of zero is treated as one.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut packer = ChunkPacker::new(max_chunk_size.max(1));

    for para in split_paragraphs(text) {
        if char_len(&para) > packer.max_chars {
            packer.flush();
            for sentence in split_into_sentences(&para) {
                packer.push(sentence, SENTENCE_SEP);
            }
        } else {
            packer.push(&para, PARAGRAPH_SEP);
        }
    }

    packer.finish()
}

/// Running buffer implementing the fill/flush rule.
struct ChunkPacker {
    max_chars: usize,
    buf: String,
    buf_chars: usize,
    chunks: Vec<String>,
}

impl ChunkPacker {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            buf: String::new(),
            buf_chars: 0,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, piece: &str, sep: &str) {
        let piece_chars = char_len(piece);
        if !self.buf.is_empty() {
            if self.buf_chars + sep.len() + piece_chars <= self.max_chars {
                self.buf.push_str(sep);
                self.buf.push_str(piece);
                self.buf_chars += sep.len() + piece_chars;
                return;
            }
            self.flush();
        }
        self.buf.push_str(piece);
        self.buf_chars = piece_chars;
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            self.chunks.push(std::mem::take(&mut self.buf));
        }
        self.buf_chars = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on one or more blank (whitespace-only) lines. Paragraphs are trimmed.
fn split_paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    paragraphs
}

/// Split a paragraph into sentences on `.`, `!` and `?`.
///
/// A run of terminators ends a sentence when followed by whitespace or the
/// end of the text, so `"v1.2 ships"` stays whole while `"Done?! Yes."`
/// yields two sentences. Terminators stay attached and every sentence is
/// trimmed.
pub fn split_into_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        while let Some(&(_, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?') {
                chars.next();
            } else {
                break;
            }
        }
        let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if at_boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

/// True when a chunk is too short to be worth embedding.
pub fn is_trivial_chunk(chunk: &str, min_chars: usize) -> bool {
    char_len(chunk.trim()) < min_chars
}

/// Importance of the chunk at `index`: `1 / (1 + 0.1 × index)`.
///
/// Leads carry the most information, so importance declines strictly with
/// position and never reaches zero.
pub fn chunk_importance(index: usize) -> f32 {
    1.0 / (1.0 + 0.1 * index as f32)
}

/// A chunk ready to be embedded and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChunk {
    pub id: String,
    pub parent_id: String,
    pub index: u32,
    pub total: u32,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub importance: f32,
}

/// Chunk `text`, drop trivial chunks, and attach ids, hashes and importance.
///
/// Indices are contiguous over the kept chunks, so the first stored chunk
/// always has importance `1.0`.
pub fn prepare_chunks(
    parent_id: &str,
    text: &str,
    max_chunk_size: usize,
    min_chars: usize,
) -> Vec<PreparedChunk> {
    prepare_from_chunks(parent_id, chunk_text(text, max_chunk_size), min_chars)
}

/// [`prepare_chunks`] over chunks the caller already produced with
/// [`chunk_text`].
pub fn prepare_from_chunks(
    parent_id: &str,
    chunks: Vec<String>,
    min_chars: usize,
) -> Vec<PreparedChunk> {
    let kept: Vec<String> = chunks
        .into_iter()
        .filter(|c| !is_trivial_chunk(c, min_chars))
        .collect();
    let total = kept.len() as u32;

    kept.into_iter()
        .enumerate()
        .map(|(index, text)| {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            let hash = format!("{:x}", hasher.finalize());

            PreparedChunk {
                id: Uuid::new_v4().to_string(),
                parent_id: parent_id.to_string(),
                index: index as u32,
                total,
                importance: chunk_importance(index),
                text,
                hash,
            }
        })
        .collect()
}
