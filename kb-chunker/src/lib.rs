//! Heading-aware Markdown/MDX chunker.
//!
//! Splits a document into sections along ATX heading boundaries, further
//! splitting oversized sections with a separator-priority recursive
//! splitter, and emits chunks with stable identity (`kb_model::chunk_id`).

mod sections;
mod splitter;

pub use sections::{split_into_sections, Section};
pub use splitter::recursive_split;

use kb_model::{Chunk, Document};

/// Chunker configuration; also the input to the index signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub max_section_chars: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_section_chars: 2000,
            chunk_size: 500,
            chunk_overlap: 80,
        }
    }
}

/// Split a document into chunks per the configured parameters.
///
/// Empty content yields zero chunks — this is a normal outcome, not an
/// error. For a given document content and chunker configuration, repeated
/// calls produce identical sequences (same count, order, and `chunk_id`).
pub fn chunk_document(doc: &Document, config: &ChunkerConfig) -> Vec<Chunk> {
    if doc.content.trim().is_empty() {
        return Vec::new();
    }

    let sections = split_into_sections(&doc.content);
    let mut chunks = Vec::with_capacity(sections.len());
    let mut chunk_index = 0usize;

    for section in sections {
        if section.text.chars().count() > config.max_section_chars {
            for piece in recursive_split(&section.text, config.chunk_size, config.chunk_overlap) {
                chunks.push(Chunk::new(
                    &doc.id,
                    &doc.version,
                    piece,
                    section.heading_path.clone(),
                    chunk_index,
                ));
                chunk_index += 1;
            }
        } else {
            chunks.push(Chunk::new(
                &doc.id,
                &doc.version,
                section.text,
                section.heading_path.clone(),
                chunk_index,
            ));
            chunk_index += 1;
        }
    }

    chunks
}
