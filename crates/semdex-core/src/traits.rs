use async_trait::async_trait;
use std::path::Path;

use crate::types::{IndexEntry, StoreHit};

/// Maps text to fixed-dimension vectors. Must be deterministic for identical
/// input within a process.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Vector store keyed by entry id and scoped by logical directory.
///
/// `upsert` must be safe to repeat with the same ids, and `query` must see
/// every upsert that completed before it started.
#[async_trait]
pub trait IndexStore: Send + Sync {
    fn dim(&self) -> usize;

    async fn upsert(&self, entries: &[IndexEntry]) -> anyhow::Result<()>;

    /// Up to `k` nearest entries whose directory is in `directories`, best first.
    async fn query(&self, vector: &[f32], k: usize, directories: &[String]) -> anyhow::Result<Vec<StoreHit>>;

    /// Delete entries of `path` with `chunk_index >= keep`. Returns how many went.
    async fn prune_document(&self, directory: &str, path: &str, keep: usize) -> anyhow::Result<usize>;

    /// Delete entries of `directory` whose path is not in `paths`.
    async fn retain_paths(&self, directory: &str, paths: &[String]) -> anyhow::Result<usize>;

    async fn count(&self, directory: &str) -> anyhow::Result<usize>;
}

/// Page-ordered plain text for a file. Plain text files are a single page.
pub trait Extractor: Send + Sync {
    fn supports(&self, path: &Path) -> bool;

    fn extract(&self, path: &Path) -> anyhow::Result<Vec<String>>;

    /// The first `max_pages` pages plus the total page count.
    fn extract_prefix(&self, path: &Path, max_pages: usize) -> anyhow::Result<(Vec<String>, usize)> {
        let mut pages = self.extract(path)?;
        let total = pages.len();
        pages.truncate(max_pages);
        Ok((pages, total))
    }
}
