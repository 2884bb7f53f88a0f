//! Directory scanner: lists eligible files under a logical directory, capped
//! at `limits.max_files` in lexical path order.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::types::Document;

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub directory: String,
    pub root: PathBuf,
    pub documents: Vec<Document>,
    /// Eligible files left out because of the cap.
    pub capped: usize,
}

pub fn scan(settings: &Settings, directory: &str) -> Result<ScanOutcome> {
    let root = settings.directory_root(directory)?;
    scan_root(&root, directory, &settings.jobs.extensions, settings.limits.max_files)
}

/// Scan `root` directly. An empty `extensions` list accepts every regular file.
pub fn scan_root(root: &Path, directory: &str, extensions: &[String], max_files: usize) -> Result<ScanOutcome> {
    if !root.is_dir() {
        return Err(Error::DirectoryNotFound(format!("{} ({})", directory, root.display())));
    }
    // Stored paths are canonical so they stay valid from any working directory.
    let root = root.canonicalize()?;
    let mut files = list_files(&root, extensions);
    let capped = files.len().saturating_sub(max_files);
    if capped > 0 {
        warn!(directory, max_files, capped, "scan truncated at file cap");
        files.truncate(max_files);
    }
    let documents = files
        .into_iter()
        .map(|path| {
            let meta = std::fs::metadata(&path).ok();
            Document {
                size: meta.as_ref().map_or(0, std::fs::Metadata::len),
                modified: meta.and_then(|m| m.modified().ok()).map(DateTime::<Utc>::from),
                directory: directory.to_string(),
                path,
            }
        })
        .collect::<Vec<_>>();
    debug!(directory, files = documents.len(), "scan complete");
    Ok(ScanOutcome { directory: directory.to_string(), root, documents, capped })
}

pub fn has_supported_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

fn list_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
        let path = entry.path();
        if has_supported_extension(path, extensions) { files.push(path.to_path_buf()); }
    }
    files.sort();
    files
}
