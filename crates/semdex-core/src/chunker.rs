//! Fixed-size character windows with overlap.
//!
//! Window `i` starts at `i * (window - overlap)`; windows are emitted until a
//! start reaches the end of the text, and the last one is clamped. Offsets
//! count `char`s, not bytes.

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::types::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub window: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { window: 1000, overlap: 200 }
    }
}

impl From<&Limits> for ChunkingConfig {
    fn from(limits: &Limits) -> Self {
        Self { window: limits.chunk_window, overlap: limits.chunk_overlap }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        validate(config.window, config.overlap)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        split(text, self.config.window, self.config.overlap)
    }
}

/// Split `text` into overlapping windows. Empty text yields no chunks.
pub fn chunk(text: &str, window: usize, overlap: usize) -> Result<Vec<Chunk>> {
    validate(window, overlap)?;
    Ok(split(text, window, overlap))
}

fn validate(window: usize, overlap: usize) -> Result<()> {
    if window == 0 || overlap >= window {
        return Err(Error::InvalidChunkParameters { window, overlap });
    }
    Ok(())
}

fn split(text: &str, window: usize, overlap: usize) -> Vec<Chunk> {
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let n = offsets.len();
    if n == 0 {
        return Vec::new();
    }
    if n < window {
        return vec![Chunk { index: 0, start: 0, text: text.to_string() }];
    }
    let byte_at = |c: usize| if c >= n { text.len() } else { offsets[c] };
    let step = window - overlap;
    let mut chunks = Vec::with_capacity(n / step + 1);
    let mut start = 0;
    while start < n {
        let end = (start + window).min(n);
        chunks.push(Chunk { index: chunks.len(), start, text: text[byte_at(start)..byte_at(end)].to_string() });
        start += step;
    }
    chunks
}
