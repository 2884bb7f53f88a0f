use arrow_schema::{Schema, Field, DataType};
use std::sync::Arc;

pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("directory", DataType::Utf8, false),
		Field::new("doc_path", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("start_offset", DataType::Int64, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Quote a string literal for a Lance SQL predicate.
pub fn sql_literal(s: &str) -> String {
	format!("'{}'", s.replace('\'', "''"))
}
