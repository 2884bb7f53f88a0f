//! semdex-core
//!
//! Configuration, error taxonomy, domain types and collaborator traits, plus
//! the pure pieces of the indexing pipeline: directory scanning, chunking and
//! text extraction.

pub mod chunker;
pub mod config;
pub mod error;
pub mod extract;
pub mod scanner;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
