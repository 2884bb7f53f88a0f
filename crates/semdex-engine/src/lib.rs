//! semdex-engine
//!
//! Reindex jobs, search and preview over the configured logical directories.
//! [`Semdex`] wires them to an embedder, an index store and an extractor.

pub mod jobs;
pub mod preview;
pub mod search;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use semdex_core::config::Settings;
use semdex_core::error::{Error, Result};
use semdex_core::extract::FileExtractor;
use semdex_core::traits::{Embedder, Extractor, IndexStore};

pub use jobs::{JobId, JobManager, JobOptions, JobState, JobStatus, Phase, SkippedFile};
pub use preview::{Preview, PreviewKind, PreviewService};
pub use search::{FileHit, SearchEngine, SearchPage, SearchRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryInfo {
    pub name: String,
    pub root: PathBuf,
    pub exists: bool,
}

pub struct Semdex {
    settings: Arc<Settings>,
    store: Arc<dyn IndexStore>,
    jobs: JobManager,
    search: SearchEngine,
    preview: Arc<PreviewService>,
}

impl Semdex {
    /// Build from settings: embedder per `[embedding]`, store per `[index]`.
    pub async fn open(settings: Settings) -> Result<Self> {
        let embedder = semdex_embed::get_default_embedder(&settings.embedding)
            .map_err(|e| Error::EmbeddingGatewayFailure(format!("{e:#}")))?;
        let store = semdex_vector::open_store(&settings).await.map_err(|e| Error::IndexStore(format!("{e:#}")))?;
        let extractor = Arc::new(FileExtractor::new(settings.jobs.extensions.clone()));
        info!(directories = settings.directories.len(), backend = ?settings.index.backend, "semdex ready");
        Self::with_components(settings, embedder, store, extractor)
    }

    pub fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        settings.validate()?;
        let settings = Arc::new(settings);
        let jobs = JobManager::new(Arc::clone(&settings), Arc::clone(&embedder), Arc::clone(&store), Arc::clone(&extractor))?;
        let search = SearchEngine::new(Arc::clone(&settings), embedder, Arc::clone(&store));
        let preview = Arc::new(PreviewService::new(&settings, extractor));
        Ok(Self { settings, store, jobs, search, preview })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn directories(&self) -> Vec<DirectoryInfo> {
        self.settings
            .roots()
            .into_iter()
            .map(|(name, root)| DirectoryInfo { exists: root.is_dir(), name, root })
            .collect()
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub fn start_reindex(&self, directory: &str, options: Option<JobOptions>) -> Result<JobId> {
        self.jobs.start(directory, options.unwrap_or_else(|| self.jobs.default_options()))
    }

    pub fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs.status(job_id)
    }

    pub fn cancel(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs.cancel(job_id)
    }

    pub async fn wait(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs.wait(job_id).await
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        self.search.search(request).await
    }

    pub async fn preview(&self, path: &str) -> Result<Preview> {
        let service = Arc::clone(&self.preview);
        let path = path.to_string();
        tokio::task::spawn_blocking(move || service.preview(&path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?
    }

    /// Number of stored chunks for `directory`.
    pub async fn indexed_chunks(&self, directory: &str) -> Result<usize> {
        self.store.count(directory).await.map_err(|e| Error::IndexStore(format!("{e:#}")))
    }
}
