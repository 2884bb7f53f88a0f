//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! on top of [`Settings::default`]. Nested keys are separated with `__` in the
//! environment, e.g. `APP_LIMITS__MAX_FILES=50`.
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Build a config from an inline TOML document; no files or env vars are read.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Figment::new().merge(Toml::string(toml)) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract typed [`Settings`], filling anything unset from the defaults.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(self.figment.clone())
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        if matches!(env, "prod" | "production") {
            let dirs: BTreeMap<String, String> = self.get("directories").unwrap_or_default();
            if dirs.is_empty() {
                anyhow::bail!("no [directories] configured for production");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base for relative directory and index paths.
    pub base_dir: PathBuf,
    /// Logical directory name -> root path.
    pub directories: BTreeMap<String, String>,
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub limits: Limits,
    pub jobs: JobSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Lance,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    pub uri: String,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub fake: bool,
    pub dim: usize,
    pub max_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_files: usize,
    pub chunk_window: usize,
    pub chunk_overlap: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub preview_pages: usize,
    pub max_preview_bytes: u64,
}

/// What a reindex job does when a single document cannot be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the file as skipped and continue with the next one.
    Skip,
    /// Fail the whole job, naming the offending file.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub failure_policy: FailurePolicy,
    pub slow_ms: u64,
    pub extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            directories: BTreeMap::new(),
            index: IndexSettings::default(),
            embedding: EmbeddingSettings::default(),
            limits: Limits::default(),
            jobs: JobSettings::default(),
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { backend: IndexBackend::Lance, uri: ".semdex/lancedb".to_string(), table: "chunks".to_string() }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, fake: false, dim: 1024, max_len: 256 }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_files: 200,
            chunk_window: 1000,
            chunk_overlap: 200,
            default_page_size: 10,
            max_page_size: 50,
            preview_pages: 10,
            max_preview_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Skip,
            slow_ms: 0,
            extensions: vec!["txt".to_string(), "md".to_string(), "pdf".to_string()],
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let l = &self.limits;
        if l.chunk_window == 0 || l.chunk_overlap >= l.chunk_window {
            return Err(Error::InvalidChunkParameters { window: l.chunk_window, overlap: l.chunk_overlap });
        }
        if l.max_page_size == 0 || l.default_page_size == 0 || l.default_page_size > l.max_page_size {
            return Err(Error::InvalidConfig(format!(
                "page sizes must satisfy 1 <= default_page_size ({}) <= max_page_size ({})",
                l.default_page_size, l.max_page_size
            )));
        }
        if l.max_files == 0 {
            return Err(Error::InvalidConfig("limits.max_files must be at least 1".to_string()));
        }
        if l.preview_pages == 0 || l.max_preview_bytes == 0 {
            return Err(Error::InvalidConfig("preview limits must be positive".to_string()));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".to_string()));
        }
        Ok(())
    }

    /// Resolve a logical directory name to its existing root path.
    pub fn directory_root(&self, name: &str) -> Result<PathBuf> {
        let raw = self
            .directories
            .get(name)
            .ok_or_else(|| Error::DirectoryNotFound(name.to_string()))?;
        let root = resolve_with_base(&self.base_dir, raw);
        if !root.is_dir() {
            return Err(Error::DirectoryNotFound(format!("{} ({})", name, root.display())));
        }
        Ok(root)
    }

    /// Every configured directory with its resolved (not necessarily existing) root.
    pub fn roots(&self) -> Vec<(String, PathBuf)> {
        self.directories
            .iter()
            .map(|(name, raw)| (name.clone(), resolve_with_base(&self.base_dir, raw)))
            .collect()
    }

    pub fn index_uri(&self) -> PathBuf {
        resolve_with_base(&self.base_dir, &self.index.uri)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
