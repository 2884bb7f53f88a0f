//! In-process index store with brute-force cosine search.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use semdex_core::traits::IndexStore;
use semdex_core::types::{IndexEntry, StoreHit};

pub struct MemoryStore { entries: RwLock<HashMap<String, IndexEntry>>, dim: usize }

impl MemoryStore {
	pub fn new(dim: usize) -> Self { Self { entries: RwLock::new(HashMap::new()), dim } }

	pub async fn len(&self) -> usize { self.entries.read().await.len() }

	pub async fn get(&self, id: &str) -> Option<IndexEntry> { self.entries.read().await.get(id).cloned() }
}

/// `1 - cos(a, b)`; a zero vector is treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
	let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
	for (x, y) in a.iter().zip(b) { dot += x * y; na += x * x; nb += y * y; }
	if na == 0.0 || nb == 0.0 { return 1.0; }
	1.0 - dot / (na.sqrt() * nb.sqrt())
}

#[async_trait]
impl IndexStore for MemoryStore {
	fn dim(&self) -> usize { self.dim }

	async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
		if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dim) { bail!("entry {} has dim {}, store expects {}", bad.id, bad.vector.len(), self.dim); }
		let mut map = self.entries.write().await;
		for e in entries { map.insert(e.id.clone(), e.clone()); }
		Ok(())
	}

	async fn query(&self, vector: &[f32], k: usize, directories: &[String]) -> Result<Vec<StoreHit>> {
		if k == 0 || directories.is_empty() { return Ok(Vec::new()); }
		if vector.len() != self.dim { bail!("query has dim {}, store expects {}", vector.len(), self.dim); }
		let map = self.entries.read().await;
		let mut hits: Vec<StoreHit> = map.values()
			.filter(|e| directories.iter().any(|d| *d == e.metadata.directory))
			.map(|e| StoreHit { id: e.id.clone(), distance: cosine_distance(vector, &e.vector), metadata: e.metadata.clone() })
			.collect();
		hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
		hits.truncate(k);
		Ok(hits)
	}

	async fn prune_document(&self, directory: &str, path: &str, keep: usize) -> Result<usize> {
		let mut map = self.entries.write().await;
		let before = map.len();
		map.retain(|_, e| !(e.metadata.directory == directory && e.metadata.path == path && e.metadata.chunk_index >= keep));
		Ok(before - map.len())
	}

	async fn retain_paths(&self, directory: &str, paths: &[String]) -> Result<usize> {
		let mut map = self.entries.write().await;
		let before = map.len();
		map.retain(|_, e| e.metadata.directory != directory || paths.contains(&e.metadata.path));
		Ok(before - map.len())
	}

	async fn count(&self, directory: &str) -> Result<usize> {
		Ok(self.entries.read().await.values().filter(|e| e.metadata.directory == directory).count())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use semdex_core::types::Chunk;

	fn entry(dir: &str, path: &str, index: usize, vector: Vec<f32>) -> IndexEntry {
		IndexEntry::new(dir, path, &Chunk { index, start: index * 800, text: format!("chunk {index}") }, vector)
	}

	#[tokio::test]
	async fn upsert_same_id_overwrites() {
		let store = MemoryStore::new(2);
		store.upsert(&[entry("docs", "/a.txt", 0, vec![1.0, 0.0])]).await.expect("upsert");
		store.upsert(&[entry("docs", "/a.txt", 0, vec![0.0, 1.0])]).await.expect("upsert");
		assert_eq!(store.len().await, 1);
		let hits = store.query(&[0.0, 1.0], 5, &["docs".to_string()]).await.expect("query");
		assert!(hits[0].distance.abs() < 1e-6);
	}

	#[tokio::test]
	async fn query_is_scoped_and_ordered() {
		let store = MemoryStore::new(2);
		store.upsert(&[
			entry("docs", "/a.txt", 0, vec![1.0, 0.0]),
			entry("docs", "/b.txt", 0, vec![0.6, 0.8]),
			entry("other", "/c.txt", 0, vec![1.0, 0.0]),
		]).await.expect("upsert");
		let hits = store.query(&[1.0, 0.0], 10, &["docs".to_string()]).await.expect("query");
		assert_eq!(hits.iter().map(|h| h.metadata.path.as_str()).collect::<Vec<_>>(), vec!["/a.txt", "/b.txt"]);
		assert!(hits[0].distance <= hits[1].distance);
		assert!(store.query(&[1.0, 0.0], 10, &[]).await.expect("query").is_empty());
		assert!(store.query(&[1.0], 10, &["docs".to_string()]).await.is_err());
	}

	#[tokio::test]
	async fn prune_and_retain_remove_stale_entries() {
		let store = MemoryStore::new(2);
		store.upsert(&[
			entry("docs", "/a.txt", 0, vec![1.0, 0.0]),
			entry("docs", "/a.txt", 1, vec![1.0, 0.0]),
			entry("docs", "/a.txt", 2, vec![1.0, 0.0]),
			entry("docs", "/gone.txt", 0, vec![1.0, 0.0]),
			entry("other", "/gone.txt", 0, vec![1.0, 0.0]),
		]).await.expect("upsert");
		assert_eq!(store.prune_document("docs", "/a.txt", 1).await.expect("prune"), 2);
		assert_eq!(store.retain_paths("docs", &["/a.txt".to_string()]).await.expect("retain"), 1);
		assert_eq!(store.count("docs").await.expect("count"), 1);
		assert_eq!(store.count("other").await.expect("count"), 1);
	}

	#[test]
	fn zero_vector_is_maximally_distant() {
		assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
		assert!(cosine_distance(&[2.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
	}
}
