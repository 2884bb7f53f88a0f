use anyhow::{anyhow, bail, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use semdex_core::traits::IndexStore;
use semdex_core::types::{EntryMetadata, IndexEntry, StoreHit};

use crate::schema::{build_arrow_schema, sql_literal};
use crate::table::{ensure_table, open_db};

/// LanceDB-backed index store. Upserts merge on `id`; queries use cosine
/// distance filtered by `directory`.
pub struct LanceStore { table: Table, table_name: String, dim: usize }

impl LanceStore {
	pub async fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
		let dim_i32 = i32::try_from(dim).map_err(|_| anyhow!("embedding dim {} too large", dim))?;
		std::fs::create_dir_all(db_path)?;
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		if ensure_table(&db, table_name, build_arrow_schema(dim_i32)).await? { info!(table = table_name, dim, "created lance table"); }
		let table = db.open_table(table_name).execute().await?;
		info!(path = %db_path.display(), table = table_name, "opened lance store");
		Ok(Self { table, table_name: table_name.to_string(), dim })
	}

	fn entries_to_record_batch(&self, entries: &[IndexEntry]) -> Result<RecordBatch> {
		let schema = build_arrow_schema(self.dim as i32);
		let mut ids = Vec::new(); let mut dirs = Vec::new(); let mut paths = Vec::new(); let mut chunk_indices = Vec::new(); let mut starts = Vec::new(); let mut contents = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
		for e in entries {
			if e.vector.len() != self.dim { bail!("entry {} has dim {}, store expects {}", e.id, e.vector.len(), self.dim); }
			ids.push(e.id.clone()); dirs.push(e.metadata.directory.clone()); paths.push(e.metadata.path.clone());
			chunk_indices.push(i32::try_from(e.metadata.chunk_index)?); starts.push(i64::try_from(e.metadata.start)?); contents.push(e.content.clone());
			vectors.push(Some(e.vector.iter().map(|&x| Some(x)).collect()));
		}
		let record_batch = RecordBatch::try_new(schema, vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(dirs)),
			Arc::new(StringArray::from(paths)),
			Arc::new(Int32Array::from(chunk_indices)),
			Arc::new(Int64Array::from(starts)),
			Arc::new(StringArray::from(contents)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), self.dim as i32)),
		])?;
		Ok(record_batch)
	}

	async fn count_where(&self, predicate: String) -> Result<usize> {
		Ok(self.table.count_rows(Some(predicate)).await?)
	}

	async fn delete_where(&self, predicate: String) -> Result<usize> {
		let n = self.count_where(predicate.clone()).await?;
		if n > 0 { self.table.delete(&predicate).await?; }
		Ok(n)
	}
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<T>()).ok_or_else(|| anyhow!("missing or mistyped column '{}'", name))
}

fn directory_filter(directories: &[String]) -> String {
	let list = directories.iter().map(|d| sql_literal(d)).collect::<Vec<_>>().join(",");
	format!("directory IN ({})", list)
}

#[async_trait]
impl IndexStore for LanceStore {
	fn dim(&self) -> usize { self.dim }

	async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
		if entries.is_empty() { return Ok(()); }
		let record_batch = self.entries_to_record_batch(entries)?; let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		// Upsert behavior via merge_insert: id is unique
		let mut mi = self.table.merge_insert(&["id"]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		mi.execute(reader).await?;
		debug!(table = %self.table_name, entries = entries.len(), "upserted");
		Ok(())
	}

	async fn query(&self, vector: &[f32], k: usize, directories: &[String]) -> Result<Vec<StoreHit>> {
		if k == 0 || directories.is_empty() { return Ok(Vec::new()); }
		if vector.len() != self.dim { bail!("query has dim {}, store expects {}", vector.len(), self.dim); }
		if self.table.count_rows(None).await? == 0 { return Ok(Vec::new()); }
		let mut results = self.table
			.vector_search(vector.to_vec())?
			.distance_type(DistanceType::Cosine)
			.only_if(directory_filter(directories))
			.limit(k)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = TryStreamExt::try_next(&mut results).await? {
			let ids = column::<StringArray>(&batch, "id")?;
			let dirs = column::<StringArray>(&batch, "directory")?;
			let paths = column::<StringArray>(&batch, "doc_path")?;
			let idxs = column::<Int32Array>(&batch, "chunk_index")?;
			let starts = column::<Int64Array>(&batch, "start_offset")?;
			let dists = column::<Float32Array>(&batch, "_distance")?;
			for i in 0..batch.num_rows() {
				hits.push(StoreHit {
					id: ids.value(i).to_string(),
					distance: dists.value(i),
					metadata: EntryMetadata {
						path: paths.value(i).to_string(),
						directory: dirs.value(i).to_string(),
						chunk_index: usize::try_from(idxs.value(i))?,
						start: usize::try_from(starts.value(i))?,
					},
				});
			}
		}
		hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
		hits.truncate(k);
		Ok(hits)
	}

	async fn prune_document(&self, directory: &str, path: &str, keep: usize) -> Result<usize> {
		self.delete_where(format!("directory = {} AND doc_path = {} AND chunk_index >= {}", sql_literal(directory), sql_literal(path), keep)).await
	}

	async fn retain_paths(&self, directory: &str, paths: &[String]) -> Result<usize> {
		let mut predicate = format!("directory = {}", sql_literal(directory));
		if !paths.is_empty() {
			let list = paths.iter().map(|p| sql_literal(p)).collect::<Vec<_>>().join(",");
			predicate.push_str(&format!(" AND doc_path NOT IN ({})", list));
		}
		self.delete_where(predicate).await
	}

	async fn count(&self, directory: &str) -> Result<usize> {
		self.count_where(format!("directory = {}", sql_literal(directory))).await
	}
}
