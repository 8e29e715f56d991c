//! Document chunking: paragraph-aware packing with a hard character budget.
//!
//! Search snippets are short and almost always fit in one chunk; the budget
//! only matters for long page bodies.

pub mod split;

/// Maximum characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4_000;

/// Characters repeated at the start of the next piece when a paragraph has
/// to be cut mid-text.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Output of the chunking process.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// 0-based position within the source document.
    pub chunk_number: usize,
    pub content: String,
}

/// Chunk `text` into pieces of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let max_chars = max_chars.max(1);
    // Overlap must leave room for forward progress.
    let overlap = overlap.min(max_chars / 2);

    split::pack_paragraphs(text, max_chars, overlap)
        .into_iter()
        .enumerate()
        .map(|(chunk_number, content)| TextChunk {
            chunk_number,
            content,
        })
        .collect()
}
