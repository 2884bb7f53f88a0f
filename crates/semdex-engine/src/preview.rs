//! Bounded file previews, confined to the configured directory roots.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use semdex_core::config::Settings;
use semdex_core::error::{Error, Result};
use semdex_core::extract::is_pdf;
use semdex_core::traits::Extractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Text,
    Pdf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preview {
    #[serde(rename = "type")]
    pub kind: PreviewKind,
    pub path: String,
    pub name: String,
    pub content: String,
    /// File size on disk, in bytes.
    pub size: u64,
    /// Total page count (PDF only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
    /// Pages included in `content` (PDF only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_pages: Option<usize>,
    /// `content` stops short of the whole file.
    pub truncated: bool,
}

pub struct PreviewService {
    /// (logical name, canonical root) for every configured root that exists.
    roots: Vec<(String, PathBuf)>,
    extractor: Arc<dyn Extractor>,
    preview_pages: usize,
    max_bytes: u64,
}

impl PreviewService {
    pub fn new(settings: &Settings, extractor: Arc<dyn Extractor>) -> Self {
        let roots = settings
            .roots()
            .into_iter()
            .filter_map(|(name, root)| root.canonicalize().ok().map(|r| (name, r)))
            .collect();
        Self { roots, extractor, preview_pages: settings.limits.preview_pages, max_bytes: settings.limits.max_preview_bytes }
    }

    /// Preview `path`: absolute, prefixed with a logical directory name
    /// (`docs/a.txt`), or relative to one of the roots. Anything resolving
    /// outside every root is `NotFound`.
    pub fn preview(&self, path: &str) -> Result<Preview> {
        let file = self.resolve(path)?;
        let size = std::fs::metadata(&file)?.len();
        let name = file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let shown = file.to_string_lossy().to_string();
        if is_pdf(&file) {
            let (pages, total) = self
                .extractor
                .extract_prefix(&file, self.preview_pages)
                .map_err(|e| Error::ExtractionFailure { path: shown.clone(), reason: format!("{e:#}") })?;
            let included = pages.len();
            debug!(path = %shown, included, total, "pdf preview");
            return Ok(Preview {
                kind: PreviewKind::Pdf,
                path: shown,
                name,
                content: pages.join("\n"),
                size,
                pages: Some(total),
                preview_pages: Some(included),
                truncated: included < total,
            });
        }
        let (content, truncated) = read_prefix(&file, self.max_bytes)?;
        debug!(path = %shown, size, truncated, "text preview");
        Ok(Preview { kind: PreviewKind::Text, path: shown, name, content, size, pages: None, preview_pages: None, truncated })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let not_found = || Error::NotFound(path.to_string());
        let requested = Path::new(path);
        let candidates: Vec<PathBuf> = if requested.is_absolute() {
            vec![requested.to_path_buf()]
        } else {
            let mut components = requested.components();
            let prefixed = match components.next() {
                Some(Component::Normal(first)) => {
                    self.roots.iter().find(|(name, _)| first.to_str() == Some(name.as_str())).map(|(_, root)| root.join(components.as_path()))
                }
                _ => None,
            };
            prefixed.into_iter().chain(self.roots.iter().map(|(_, root)| root.join(requested))).collect()
        };
        for candidate in candidates {
            let Ok(canonical) = candidate.canonicalize() else { continue };
            if canonical.is_file() && self.roots.iter().any(|(_, root)| canonical.starts_with(root)) {
                return Ok(canonical);
            }
        }
        Err(not_found())
    }
}

/// Up to `max_bytes` of the file as text. A multi-byte character cut at the
/// limit is dropped rather than replaced.
fn read_prefix(path: &Path, max_bytes: u64) -> Result<(String, bool)> {
    let mut buf = Vec::new();
    File::open(path)?.take(max_bytes + 1).read_to_end(&mut buf)?;
    let truncated = buf.len() as u64 > max_bytes;
    if truncated {
        buf.truncate(max_bytes as usize);
        if let Err(e) = std::str::from_utf8(&buf) {
            if e.error_len().is_none() {
                buf.truncate(e.valid_up_to());
            }
        }
    }
    Ok((String::from_utf8_lossy(&buf).into_owned(), truncated))
}
