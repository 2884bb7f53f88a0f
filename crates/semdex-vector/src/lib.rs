//! semdex-vector
//!
//! Index store backends: LanceDB on disk and an in-memory store.

pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

use anyhow::Result;
use std::sync::Arc;

use semdex_core::config::{IndexBackend, Settings};
use semdex_core::traits::IndexStore;

pub use lance::LanceStore;
pub use memory::MemoryStore;

/// Open the store selected by `[index].backend`.
pub async fn open_store(settings: &Settings) -> Result<Arc<dyn IndexStore>> {
	let dim = settings.embedding.dim;
	match settings.index.backend {
		IndexBackend::Lance => Ok(Arc::new(LanceStore::open(&settings.index_uri(), &settings.index.table, dim).await?)),
		IndexBackend::Memory => Ok(Arc::new(MemoryStore::new(dim))),
	}
}
