//! Paginated semantic search over distinct files.
//!
//! Chunk hits are folded into one result per path, ranked by the path's best
//! (lowest) cosine distance with ties broken by path.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use semdex_core::config::Settings;
use semdex_core::error::{Error, Result};
use semdex_core::traits::{Embedder, IndexStore};
use semdex_core::types::StoreHit;

/// Chunks fetched per wanted path on the first query.
const OVERFETCH: usize = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Logical directories to search; empty means every configured one.
    #[serde(default)]
    pub directories: Vec<String>,
    /// 1-based.
    pub page: usize,
    /// Falls back to `limits.default_page_size`.
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub max_distance: Option<f32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), page: 1, ..Self::default() }
    }

    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.directories.push(directory.into());
        self
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = Some(page_size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHit {
    pub path: String,
    pub directory: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    pub query: String,
    pub directories: Vec<String>,
    pub page: usize,
    pub page_size: usize,
    pub has_next: bool,
    pub results: Vec<FileHit>,
}

impl SearchPage {
    pub fn paths(&self) -> Vec<&str> {
        self.results.iter().map(|h| h.path.as_str()).collect()
    }
}

#[derive(Clone)]
pub struct SearchEngine {
    settings: Arc<Settings>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
}

impl SearchEngine {
    pub fn new(settings: Arc<Settings>, embedder: Arc<dyn Embedder>, store: Arc<dyn IndexStore>) -> Self {
        Self { settings, embedder, store }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".to_string()));
        }
        let limits = &self.settings.limits;
        let page_size = request.page_size.unwrap_or(limits.default_page_size);
        if page_size == 0 || page_size > limits.max_page_size {
            return Err(Error::InvalidQuery(format!("page_size must be between 1 and {}", limits.max_page_size)));
        }
        if request.page == 0 {
            return Err(Error::InvalidQuery("page must be 1 or greater".to_string()));
        }
        if let Some(d) = request.max_distance {
            if !d.is_finite() || d < 0.0 {
                return Err(Error::InvalidQuery(format!("max_distance must be a non-negative number, got {d}")));
            }
        }
        // One extra path tells whether another page exists.
        let offset = (request.page - 1).checked_mul(page_size);
        let (Some(offset), Some(wanted)) = (offset, offset.and_then(|o| o.checked_add(page_size + 1))) else {
            return Err(Error::InvalidQuery(format!("page {} is out of range", request.page)));
        };
        let directories = self.resolve_directories(&request.directories)?;

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_text(&text))
            .await
            .map_err(|e| Error::EmbeddingGatewayFailure(e.to_string()))?
            .map_err(|e| Error::EmbeddingGatewayFailure(format!("{e:#}")))?;

        let ranked = self.ranked_files(&vector, &directories, wanted, request.max_distance).await?;
        let has_next = ranked.len() > offset + page_size;
        let results: Vec<FileHit> = ranked.into_iter().skip(offset).take(page_size).collect();
        debug!(query, page = request.page, page_size, results = results.len(), has_next, "search");
        Ok(SearchPage { query: query.to_string(), directories, page: request.page, page_size, has_next, results })
    }

    fn resolve_directories(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Ok(self.settings.directories.keys().cloned().collect());
        }
        let mut names = BTreeSet::new();
        for name in requested {
            if !self.settings.directories.contains_key(name) {
                return Err(Error::DirectoryNotFound(name.clone()));
            }
            names.insert(name.clone());
        }
        Ok(names.into_iter().collect())
    }

    /// At least `wanted` distinct files in rank order, or every matching file
    /// if fewer exist. Re-queries with a doubled `k` while chunk hits from the
    /// same files leave the list short.
    async fn ranked_files(
        &self,
        vector: &[f32],
        directories: &[String],
        wanted: usize,
        max_distance: Option<f32>,
    ) -> Result<Vec<FileHit>> {
        if directories.is_empty() {
            return Ok(Vec::new());
        }
        let mut k = wanted.saturating_mul(OVERFETCH);
        loop {
            let hits = self
                .store
                .query(vector, k, directories)
                .await
                .map_err(|e| Error::IndexStore(format!("{e:#}")))?;
            let boundary = hits.last().map(|h| h.distance);
            let exhausted = hits.len() < k || max_distance.zip(boundary).is_some_and(|(max, last)| last > max);
            let files = best_per_file(&hits, max_distance);
            if exhausted {
                return Ok(files);
            }
            // A file whose best chunk ties the k-th hit may have an equally
            // close sibling that was cut off, so only strictly closer ones count.
            let settled = files.iter().take_while(|f| boundary.is_some_and(|b| f.distance < b)).count();
            if settled >= wanted {
                return Ok(files);
            }
            debug!(k, distinct = files.len(), wanted, "under-filled page, widening query");
            k = k.saturating_mul(2);
        }
    }
}

fn best_per_file(hits: &[StoreHit], max_distance: Option<f32>) -> Vec<FileHit> {
    let mut best: HashMap<&str, FileHit> = HashMap::new();
    for hit in hits {
        if max_distance.is_some_and(|max| hit.distance > max) {
            continue;
        }
        best.entry(hit.metadata.path.as_str())
            .and_modify(|f| {
                if hit.distance < f.distance {
                    f.distance = hit.distance;
                }
            })
            .or_insert_with(|| FileHit {
                path: hit.metadata.path.clone(),
                directory: hit.metadata.directory.clone(),
                distance: hit.distance,
            });
    }
    let mut files: Vec<FileHit> = best.into_values().collect();
    files.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.path.cmp(&b.path)));
    files
}
