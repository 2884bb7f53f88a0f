//! Reindex jobs.
//!
//! [`JobRegistry`] is the process-scoped table of job snapshots, keyed by job
//! id and indexed by logical directory. Each job is driven by one spawned
//! worker task, which is the only writer of that job's snapshot; readers get
//! point-in-time clones.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use semdex_core::chunker::{Chunker, ChunkingConfig};
use semdex_core::config::{FailurePolicy, JobSettings, Settings};
use semdex_core::error::{Error, Result};
use semdex_core::scanner::{scan, ScanOutcome};
use semdex_core::traits::{Embedder, Extractor, IndexStore};
use semdex_core::types::{Document, IndexEntry};

pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Indexing,
    Completed,
    Error,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        self != JobState::Indexing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Reading,
    Embedding,
    Storing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Snapshot of one reindex run as seen by a polling client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub directory: String,
    pub status: JobState,
    pub phase: Phase,
    /// Documents processed so far, skipped ones included.
    pub current: usize,
    /// Documents found by the scan; fixed once scanning finishes.
    pub total: usize,
    pub percent: f64,
    pub current_file: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub chunks_indexed: usize,
    pub skipped: Vec<SkippedFile>,
    /// Eligible files left out by the scan cap.
    pub capped: usize,
}

impl JobStatus {
    fn new(job_id: &str, directory: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            directory: directory.to_string(),
            status: JobState::Indexing,
            phase: Phase::Reading,
            current: 0,
            total: 0,
            percent: 0.0,
            current_file: None,
            updated_at: Utc::now(),
            error: None,
            chunks_indexed: 0,
            skipped: Vec::new(),
            capped: 0,
        }
    }

    fn touch(&mut self) {
        self.percent = percent(self.current, self.total);
        self.updated_at = Utc::now();
    }
}

/// `100 * current / total` rounded to one decimal; 0 when nothing was found.
pub fn percent(current: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (1000.0 * current as f64 / total as f64).round() / 10.0
}

struct JobRecord {
    status: JobStatus,
    cancel: Arc<AtomicBool>,
    done: watch::Receiver<bool>,
}

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<JobId, JobRecord>,
    by_directory: HashMap<String, JobId>,
}

/// Holds the latest job per logical directory until a new job for that
/// directory replaces it.
#[derive(Default)]
pub struct JobRegistry {
    state: RwLock<RegistryState>,
}

impl JobRegistry {
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobStatus> {
        self.read().jobs.get(job_id).map(|r| r.status.clone())
    }

    /// Create a fresh `indexing` record for `directory`, evicting its previous
    /// terminal job. Fails while that directory still has an active job.
    fn register(&self, directory: &str) -> Result<(JobId, Arc<AtomicBool>, watch::Sender<bool>)> {
        let mut guard = self.write();
        let state = &mut *guard;
        if let Some(previous) = state.by_directory.get(directory).cloned() {
            if let Some(record) = state.jobs.get(&previous) {
                if !record.status.status.is_terminal() {
                    return Err(Error::JobAlreadyRunning { directory: directory.to_string(), job_id: previous });
                }
            }
            state.jobs.remove(&previous);
            debug!(directory, job_id = %previous, "evicted previous job");
        }
        let job_id = uuid::Uuid::new_v4().to_string();
        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);
        state.jobs.insert(
            job_id.clone(),
            JobRecord { status: JobStatus::new(&job_id, directory), cancel: Arc::clone(&cancel), done: done_rx },
        );
        state.by_directory.insert(directory.to_string(), job_id.clone());
        Ok((job_id, cancel, done_tx))
    }

    fn update(&self, job_id: &str, f: impl FnOnce(&mut JobStatus)) {
        if let Some(record) = self.write().jobs.get_mut(job_id) {
            f(&mut record.status);
            record.status.touch();
        }
    }

    fn cancel_flag(&self, job_id: &str) -> Option<Arc<AtomicBool>> {
        self.read().jobs.get(job_id).map(|r| Arc::clone(&r.cancel))
    }

    fn done(&self, job_id: &str) -> Option<watch::Receiver<bool>> {
        self.read().jobs.get(job_id).map(|r| r.done.clone())
    }
}

/// Per-run knobs; defaults come from `[jobs]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Artificial pause before each document. Pacing only.
    pub slow_ms: u64,
    pub failure_policy: FailurePolicy,
}

impl From<&JobSettings> for JobOptions {
    fn from(jobs: &JobSettings) -> Self {
        Self { slow_ms: jobs.slow_ms, failure_policy: jobs.failure_policy }
    }
}

#[derive(Clone)]
pub struct JobManager {
    settings: Arc<Settings>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    extractor: Arc<dyn Extractor>,
    chunker: Chunker,
    registry: Arc<JobRegistry>,
}

impl JobManager {
    pub fn new(
        settings: Arc<Settings>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        if embedder.dim() != store.dim() {
            return Err(Error::InvalidConfig(format!(
                "embedder produces {} dims but the index store holds {}",
                embedder.dim(),
                store.dim()
            )));
        }
        let chunker = Chunker::new(ChunkingConfig::from(&settings.limits))?;
        Ok(Self { settings, embedder, store, extractor, chunker, registry: Arc::new(JobRegistry::default()) })
    }

    pub fn default_options(&self) -> JobOptions {
        JobOptions::from(&self.settings.jobs)
    }

    /// Start reindexing `directory` in the background and return its job id
    /// without waiting. Must be called from within a Tokio runtime.
    pub fn start(&self, directory: &str, options: JobOptions) -> Result<JobId> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::InvalidConfig(format!("reindex needs a Tokio runtime: {e}")))?;
        self.settings.directory_root(directory)?;
        let (job_id, cancel, done) = self.registry.register(directory)?;
        info!(job_id = %job_id, directory, slow_ms = options.slow_ms, policy = ?options.failure_policy, "reindex job started");
        let worker = Worker {
            job_id: job_id.clone(),
            directory: directory.to_string(),
            options,
            settings: Arc::clone(&self.settings),
            embedder: Arc::clone(&self.embedder),
            store: Arc::clone(&self.store),
            extractor: Arc::clone(&self.extractor),
            chunker: self.chunker,
            registry: Arc::clone(&self.registry),
            cancel,
        };
        runtime.spawn(worker.run(done));
        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatus> {
        self.registry.snapshot(job_id).ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    /// Ask the worker to stop. It checks the flag between documents and
    /// phases, so the job turns `cancelled` shortly after.
    pub fn cancel(&self, job_id: &str) -> Result<JobStatus> {
        let flag = self.registry.cancel_flag(job_id).ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        flag.store(true, Ordering::SeqCst);
        debug!(job_id, "cancel requested");
        self.status(job_id)
    }

    /// Wait for the job to reach a terminal state and return that snapshot.
    pub async fn wait(&self, job_id: &str) -> Result<JobStatus> {
        let mut done = self.registry.done(job_id).ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        // Err only if the worker is gone, in which case the snapshot is final anyway.
        let _ = done.wait_for(|finished| *finished).await;
        self.status(job_id)
    }
}

enum Flow {
    Done,
    Cancelled,
}

enum DocOutcome {
    Stored(usize),
    Skipped(String),
    Cancelled,
}

struct Worker {
    job_id: JobId,
    directory: String,
    options: JobOptions,
    settings: Arc<Settings>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    extractor: Arc<dyn Extractor>,
    chunker: Chunker,
    registry: Arc<JobRegistry>,
    cancel: Arc<AtomicBool>,
}

impl Worker {
    async fn run(self, done: watch::Sender<bool>) {
        let outcome = AssertUnwindSafe(self.index()).catch_unwind().await;
        match outcome {
            Ok(Ok(Flow::Done)) => self.finish(JobState::Completed, None),
            Ok(Ok(Flow::Cancelled)) => self.finish(JobState::Cancelled, None),
            Ok(Err(e)) => self.finish(JobState::Error, Some(e.to_string())),
            Err(panic) => self.finish(JobState::Error, Some(format!("worker panicked: {}", panic_message(&*panic)))),
        }
        done.send_replace(true);
    }

    async fn index(&self) -> Result<Flow> {
        let settings = Arc::clone(&self.settings);
        let directory = self.directory.clone();
        let ScanOutcome { documents, capped, .. } = blocking(move || scan(&settings, &directory)).await??;
        let total = documents.len();
        self.registry.update(&self.job_id, |s| {
            s.total = total;
            s.capped = capped;
        });
        debug!(job_id = %self.job_id, total, capped, "scan finished");

        let mut kept = Vec::with_capacity(total);
        for doc in documents {
            if self.cancelled() {
                return Ok(Flow::Cancelled);
            }
            let path = doc.path_key();
            self.registry.update(&self.job_id, |s| {
                s.phase = Phase::Reading;
                s.current_file = Some(path.clone());
            });
            if self.options.slow_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.options.slow_ms)).await;
            }
            match self.index_document(&doc, &path).await? {
                DocOutcome::Cancelled => return Ok(Flow::Cancelled),
                DocOutcome::Stored(n) => {
                    kept.push(path);
                    self.registry.update(&self.job_id, |s| {
                        s.current += 1;
                        s.chunks_indexed += n;
                    });
                }
                DocOutcome::Skipped(reason) => self.registry.update(&self.job_id, |s| {
                    s.current += 1;
                    s.skipped.push(SkippedFile { path, reason });
                }),
            }
        }

        if self.cancelled() {
            return Ok(Flow::Cancelled);
        }
        let removed = self.store.retain_paths(&self.directory, &kept).await.map_err(store_error)?;
        if removed > 0 {
            debug!(job_id = %self.job_id, removed, "removed entries of vanished files");
        }
        Ok(Flow::Done)
    }

    /// Extract, chunk, embed and store one document. Its chunks are upserted
    /// as a single batch before the caller advances `current`.
    async fn index_document(&self, doc: &Document, path: &str) -> Result<DocOutcome> {
        let extractor = Arc::clone(&self.extractor);
        let chunker = self.chunker;
        let file = doc.path.clone();
        let extracted = blocking(move || {
            extractor.extract(&file).map(|pages| {
                let text = pages.join("\n");
                if text.trim().is_empty() { Vec::new() } else { chunker.chunk(&text) }
            })
        })
        .await?;
        let chunks = match extracted {
            Ok(chunks) => chunks,
            Err(e) => {
                let reason = format!("{e:#}");
                return match self.options.failure_policy {
                    FailurePolicy::Skip => {
                        warn!(job_id = %self.job_id, path, reason = %reason, "skipping unreadable file");
                        Ok(DocOutcome::Skipped(reason))
                    }
                    FailurePolicy::Abort => Err(Error::ExtractionFailure { path: path.to_string(), reason }),
                };
            }
        };

        if self.cancelled() {
            return Ok(DocOutcome::Cancelled);
        }
        self.set_phase(Phase::Embedding);
        let vectors = if chunks.is_empty() {
            Vec::new()
        } else {
            let embedder = Arc::clone(&self.embedder);
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            blocking(move || embedder.embed_batch(&texts))
                .await?
                .map_err(|e| Error::EmbeddingGatewayFailure(format!("{path}: {e:#}")))?
        };
        if vectors.len() != chunks.len() {
            return Err(Error::EmbeddingGatewayFailure(format!(
                "{path}: got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.store.dim()) {
            return Err(Error::EmbeddingGatewayFailure(format!(
                "{path}: vector has {} dims, expected {}",
                v.len(),
                self.store.dim()
            )));
        }

        if self.cancelled() {
            return Ok(DocOutcome::Cancelled);
        }
        self.set_phase(Phase::Storing);
        let entries: Vec<IndexEntry> =
            chunks.iter().zip(vectors).map(|(chunk, vector)| IndexEntry::new(&self.directory, path, chunk, vector)).collect();
        self.store.upsert(&entries).await.map_err(store_error)?;
        let pruned = self.store.prune_document(&self.directory, path, entries.len()).await.map_err(store_error)?;
        debug!(job_id = %self.job_id, path, chunks = entries.len(), pruned, "document stored");
        Ok(DocOutcome::Stored(entries.len()))
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: Phase) {
        debug!(job_id = %self.job_id, ?phase, "phase");
        self.registry.update(&self.job_id, |s| s.phase = phase);
    }

    fn finish(&self, state: JobState, error: Option<String>) {
        self.registry.update(&self.job_id, |s| {
            if s.status.is_terminal() {
                return;
            }
            s.status = state;
            s.error = error;
            s.current_file = None;
            if state == JobState::Completed {
                s.phase = Phase::Completed;
            }
        });
        match self.registry.snapshot(&self.job_id) {
            Some(s) if s.status == JobState::Error => {
                error!(job_id = %self.job_id, directory = %self.directory, error = s.error.as_deref().unwrap_or(""), "reindex job failed")
            }
            Some(s) => info!(
                job_id = %self.job_id,
                directory = %self.directory,
                status = ?s.status,
                files = s.current,
                chunks = s.chunks_indexed,
                skipped = s.skipped.len(),
                "reindex job finished"
            ),
            None => {}
        }
    }
}

/// Run `f` on the blocking pool. A panic inside `f` resumes on this task.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| match e.try_into_panic() {
        Ok(payload) => std::panic::resume_unwind(payload),
        Err(e) => Error::Io(std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string())),
    })
}

fn store_error(e: anyhow::Error) -> Error {
    Error::IndexStore(format!("{e:#}"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_zero_without_files_and_rounded() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(1, 3), 33.3);
        assert_eq!(percent(2, 3), 66.7);
        assert_eq!(percent(4, 4), 100.0);
    }

    #[test]
    fn register_rejects_second_active_job_for_directory() {
        let registry = JobRegistry::default();
        let (first, _, _tx) = registry.register("docs").expect("first");
        match registry.register("docs") {
            Err(Error::JobAlreadyRunning { directory, job_id }) => {
                assert_eq!(directory, "docs");
                assert_eq!(job_id, first);
            }
            other => panic!("expected JobAlreadyRunning, got {:?}", other.map(|r| r.0)),
        }
        assert!(registry.register("notes").is_ok());
    }

    #[test]
    fn finished_job_is_evicted_by_next_run() {
        let registry = JobRegistry::default();
        let (first, _, _tx) = registry.register("docs").expect("first");
        registry.update(&first, |s| s.status = JobState::Completed);
        let (second, _, _tx2) = registry.register("docs").expect("second");
        assert_ne!(first, second);
        assert!(registry.snapshot(&first).is_none());
        let state = registry.read();
        assert_eq!(state.by_directory.get("docs"), Some(&second));
        assert_eq!(state.jobs.len(), 1);
    }

    #[test]
    fn snapshot_serializes_lowercase_states() {
        let s = JobStatus::new("j1", "docs");
        let v = serde_json::to_value(&s).expect("json");
        assert_eq!(v["status"], "indexing");
        assert_eq!(v["phase"], "reading");
        assert_eq!(v["percent"], 0.0);
        assert!(v["error"].is_null());
    }
}
