//! Domain types shared by the scanner, chunker, index stores and engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type EntryId = String;

/// A file discovered under a logical directory during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub directory: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl Document {
    /// Path as stored in index metadata and returned by search.
    pub fn path_key(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

/// A contiguous window of a document's text.
///
/// `start` is a character offset; `index` is dense and ordered by `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub text: String,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Exclusive end offset in characters.
    pub fn end(&self) -> usize {
        self.start + self.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub path: String,
    pub directory: String,
    pub chunk_index: usize,
    pub start: usize,
}

/// The persisted unit of the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: EntryId,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
    pub content: String,
}

impl IndexEntry {
    pub fn new(directory: &str, path: &str, chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: entry_id(directory, path, chunk.index),
            vector,
            metadata: EntryMetadata {
                path: path.to_string(),
                directory: directory.to_string(),
                chunk_index: chunk.index,
                start: chunk.start,
            },
            content: chunk.text.clone(),
        }
    }
}

/// One nearest-neighbour match. Lower `distance` is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHit {
    pub id: EntryId,
    pub distance: f32,
    pub metadata: EntryMetadata,
}

/// Deterministic entry id: re-indexing the same chunk position overwrites it.
pub fn entry_id(directory: &str, path: &str, chunk_index: usize) -> EntryId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(directory.as_bytes());
    hasher.update(&[0]);
    hasher.update(path.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(chunk_index as u64).to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_is_stable_and_distinct() {
        let a = entry_id("docs", "/d/a.txt", 0);
        assert_eq!(a, entry_id("docs", "/d/a.txt", 0));
        assert_ne!(a, entry_id("docs", "/d/a.txt", 1));
        assert_ne!(a, entry_id("other", "/d/a.txt", 0));
        // separator keeps "ab"+"c" apart from "a"+"bc"
        assert_ne!(entry_id("ab", "c", 0), entry_id("a", "bc", 0));
        assert_eq!(a.len(), 64);
    }
}
