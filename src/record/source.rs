//! Record sources: where a site's base collection comes from.

use std::path::{Path, PathBuf};

use super::{QuerySet, Record};

/// Errors raised while loading records.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read data file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse data file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type SourceResult<T> = Result<T, SourceError>;

/// The base record collection of a report site.
pub trait RecordSource: Send + Sync {
    /// Records before any filtering, in their natural order.
    fn base_collection(&self) -> QuerySet;
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl RecordSource for MemorySource {
    fn base_collection(&self) -> QuerySet {
        QuerySet::new(self.records.clone())
    }
}

/// Records loaded once from a JSON array of objects.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    inner: MemorySource,
}

impl JsonFileSource {
    pub fn load<P: AsRef<Path>>(path: P) -> SourceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let records: Vec<Record> =
            serde_json::from_str(&content).map_err(|source| SourceError::Json {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), count = records.len(), "loaded records");

        Ok(Self {
            path,
            inner: MemorySource::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[Record] {
        self.inner.records()
    }
}

impl RecordSource for JsonFileSource {
    fn base_collection(&self) -> QuerySet {
        self.inner.base_collection()
    }
}
