//! Page-ordered text extraction for plain text and PDF files.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::scanner::has_supported_extension;
use crate::traits::Extractor;

pub fn is_pdf(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Reads `.pdf` files page by page with lopdf and everything else as one
/// lossily-decoded UTF-8 page.
#[derive(Debug, Clone)]
pub struct FileExtractor {
    extensions: Vec<String>,
}

impl FileExtractor {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    fn read_text(path: &Path) -> Result<String> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(path).with_context(|| format!("reading {}", path.display()))?).to_string()),
        }
    }

    fn read_pdf(path: &Path, max_pages: Option<usize>) -> Result<(Vec<String>, usize)> {
        let doc = lopdf::Document::load(path).map_err(|e| anyhow!("opening PDF {}: {}", path.display(), e))?;
        let numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let total = numbers.len();
        let take = max_pages.unwrap_or(total).min(total);
        let mut pages = Vec::with_capacity(take);
        for n in &numbers[..take] {
            let text = doc.extract_text(&[*n]).map_err(|e| anyhow!("page {} of {}: {}", n, path.display(), e))?;
            pages.push(text);
        }
        debug!(path = %path.display(), pages = pages.len(), total, "extracted pdf");
        Ok((pages, total))
    }
}

impl Default for FileExtractor {
    fn default() -> Self {
        Self::new(vec!["txt".to_string(), "md".to_string(), "pdf".to_string()])
    }
}

impl Extractor for FileExtractor {
    fn supports(&self, path: &Path) -> bool {
        has_supported_extension(path, &self.extensions)
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        if is_pdf(path) {
            return Ok(Self::read_pdf(path, None)?.0);
        }
        Ok(vec![Self::read_text(path)?])
    }

    fn extract_prefix(&self, path: &Path, max_pages: usize) -> Result<(Vec<String>, usize)> {
        if is_pdf(path) {
            return Self::read_pdf(path, Some(max_pages));
        }
        let pages = self.extract(path)?;
        let total = pages.len();
        Ok((pages.into_iter().take(max_pages).collect(), total))
    }
}
