//! Serialising merged collections to disk.

pub mod parquet;

use std::path::Path;

use crate::{dataset::VariableCollection, error::Result};

pub use parquet::ParquetOutputWriter;

/// Persists a collection at a path. Implementations must never leave a
/// partially written file behind, and must produce identical bytes for
/// identical input.
pub trait OutputWriter {
    fn write(&self, collection: &VariableCollection, path: &Path) -> Result<()>;

    /// File extension of the produced files, without the dot.
    fn extension(&self) -> &str;
}
