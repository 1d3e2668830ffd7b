use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const META_SOURCE: &str = "source";
pub const META_FILE_PATH: &str = "file_path";
pub const META_PAGE: &str = "page";
pub const META_TOTAL_PAGES: &str = "total_pages";
pub const META_START_INDEX: &str = "start_index";

pub type Metadata = BTreeMap<String, Value>;

/// A unit of loaded text, one per PDF page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn page(&self) -> Option<u64> {
        self.metadata.get(META_PAGE).and_then(Value::as_u64)
    }
}

/// A bounded window of a [`Document`], tagged with the file it came from
/// and its character offset inside the parent page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).and_then(Value::as_str)
    }

    pub fn start_index(&self) -> Option<usize> {
        self.metadata
            .get(META_START_INDEX)
            .and_then(Value::as_u64)
            .map(|index| index as usize)
    }

    pub fn page(&self) -> Option<u64> {
        self.metadata.get(META_PAGE).and_then(Value::as_u64)
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Lower is closer.
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Squared euclidean distance.
    #[default]
    L2,
    /// `1 - cosine similarity`.
    Cosine,
}

/// What `index_documents` does with an index that is already on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Discard whatever was persisted before. Indexing a second file evicts
    /// the first one from retrieval.
    #[default]
    Replace,
    /// Keep persisted entries from other sources and replace only the
    /// entries of the sources being indexed.
    Merge,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub storage_dir: PathBuf,
    pub index_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub persist_mode: PersistMode,
    pub metric: DistanceMetric,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("pdfs"),
            index_path: PathBuf::from("vectorstore/db_faiss"),
            chunk_size: 1_000,
            chunk_overlap: 200,
            top_k: 5,
            persist_mode: PersistMode::Replace,
            metric: DistanceMetric::L2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_accessors_read_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), Value::from("a.pdf"));
        metadata.insert(META_START_INDEX.to_string(), Value::from(800u64));
        metadata.insert(META_PAGE.to_string(), Value::from(2u64));
        let chunk = Chunk {
            text: "héllo".to_string(),
            metadata,
        };

        assert_eq!(chunk.source(), Some("a.pdf"));
        assert_eq!(chunk.start_index(), Some(800));
        assert_eq!(chunk.page(), Some(2));
        assert_eq!(chunk.char_len(), 5);
    }

    #[test]
    fn defaults_follow_the_observed_pipeline() {
        let options = PipelineOptions::default();
        assert_eq!(options.chunk_size, 1_000);
        assert_eq!(options.chunk_overlap, 200);
        assert_eq!(options.top_k, 5);
        assert_eq!(options.persist_mode, PersistMode::Replace);
        assert_eq!(options.index_path, PathBuf::from("vectorstore/db_faiss"));
    }
}
