use crate::models::{Chunk, DistanceMetric, SearchHit};
use crate::IndexError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const INDEX_FILE_NAME: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// Exact nearest-neighbour index over every stored vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    format_version: u32,
    model_id: String,
    dimensions: usize,
    metric: DistanceMetric,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    pub fn new(model_id: impl Into<String>, dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model_id: model_id.into(),
            dimensions,
            metric,
            built_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    pub fn add(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<(), IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        if let Some(wrong) = embeddings.iter().find(|v| v.len() != self.dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: wrong.len(),
            });
        }

        self.entries.extend(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, vector)| IndexEntry {
                    id: make_chunk_id(&chunk),
                    vector,
                    chunk,
                }),
        );
        self.built_at = Utc::now();
        Ok(())
    }

    /// Drops every entry whose chunk does not satisfy `keep`; returns how many
    /// were removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Chunk) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|entry| keep(&entry.chunk));
        before - self.entries.len()
    }

    /// The `k` closest entries, closest first. Equal distances keep insertion order.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query_vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (distance(self.metric, query_vector, &entry.vector), entry))
            .collect();
        scored.sort_by(|left, right| left.0.total_cmp(&right.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, entry)| SearchHit {
                chunk: entry.chunk.clone(),
                distance,
            })
            .collect())
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE_NAME).is_file()
    }

    /// Writes `<dir>/index.json` through a temporary file and a rename.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, IndexError> {
        fs::create_dir_all(dir)?;
        let target = dir.join(INDEX_FILE_NAME);
        let staging = dir.join(format!("{INDEX_FILE_NAME}.tmp"));

        let bytes = serde_json::to_vec(self)?;
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &target)?;

        debug!(path = %target.display(), entries = self.entries.len(), "saved index");
        Ok(target)
    }

    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(INDEX_FILE_NAME);
        if !path.is_file() {
            return Err(IndexError::IndexNotFound(dir.to_path_buf()));
        }

        let bytes = fs::read(&path)?;
        let index: FlatIndex = serde_json::from_slice(&bytes)?;
        if index.format_version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedFormat(index.format_version));
        }

        debug!(path = %path.display(), entries = index.entries.len(), "loaded index");
        Ok(index)
    }
}

fn distance(metric: DistanceMetric, left: &[f32], right: &[f32]) -> f32 {
    match metric {
        DistanceMetric::L2 => left
            .iter()
            .zip(right)
            .map(|(a, b)| (a - b) * (a - b))
            .sum(),
        DistanceMetric::Cosine => {
            let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
            let left_norm = left.iter().map(|a| a * a).sum::<f32>().sqrt();
            let right_norm = right.iter().map(|b| b * b).sum::<f32>().sqrt();
            if left_norm == 0.0 || right_norm == 0.0 {
                1.0
            } else {
                1.0 - dot / (left_norm * right_norm)
            }
        }
    }
}

fn make_chunk_id(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.source().unwrap_or_default().as_bytes());
    hasher.update(chunk.page().unwrap_or_default().to_le_bytes());
    hasher.update((chunk.start_index().unwrap_or_default() as u64).to_le_bytes());
    hasher.update(chunk.text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, META_SOURCE};
    use tempfile::tempdir;

    fn chunk(text: &str, source: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), source.into());
        Chunk {
            text: text.to_string(),
            metadata,
        }
    }

    fn sample_index(metric: DistanceMetric) -> Result<FlatIndex, IndexError> {
        let mut index = FlatIndex::new("test-model", 2, metric);
        index.add(
            vec![chunk("east", "a.pdf"), chunk("north", "b.pdf"), chunk("far east", "a.pdf")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![3.0, 0.0]],
        )?;
        Ok(index)
    }

    #[test]
    fn l2_search_orders_by_distance() -> Result<(), IndexError> {
        let index = sample_index(DistanceMetric::L2)?;

        let hits = index.search(&[0.9, 0.1], 3)?;

        let texts: Vec<_> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "north", "far east"]);
        assert!((hits[0].distance - 0.02).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn cosine_search_ignores_magnitude() -> Result<(), IndexError> {
        let index = sample_index(DistanceMetric::Cosine)?;

        let hits = index.search(&[2.0, 0.0], 2)?;

        let texts: Vec<_> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "far east"]);
        assert!(hits[1].distance.abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn search_returns_at_most_k() -> Result<(), IndexError> {
        let index = sample_index(DistanceMetric::L2)?;
        assert_eq!(index.search(&[0.0, 0.0], 1)?.len(), 1);
        assert_eq!(index.search(&[0.0, 0.0], 10)?.len(), 3);
        Ok(())
    }

    #[test]
    fn add_rejects_mismatched_inputs() {
        let mut index = FlatIndex::new("test-model", 2, DistanceMetric::L2);
        assert!(matches!(
            index.add(vec![chunk("a", "a.pdf")], vec![]),
            Err(IndexError::CountMismatch { chunks: 1, embeddings: 0 })
        ));
        assert!(matches!(
            index.add(vec![chunk("a", "a.pdf")], vec![vec![1.0, 2.0, 3.0]]),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn retain_drops_entries_by_source() -> Result<(), IndexError> {
        let mut index = sample_index(DistanceMetric::L2)?;
        let removed = index.retain(|chunk| chunk.source() != Some("a.pdf"));
        assert_eq!(removed, 2);
        assert_eq!(index.len(), 1);
        Ok(())
    }

    #[test]
    fn saved_index_loads_back_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("vectorstore").join("db");
        let index = sample_index(DistanceMetric::Cosine)?;

        index.save(&path)?;
        let loaded = FlatIndex::load(&path)?;

        assert_eq!(loaded, index);
        assert!(FlatIndex::exists(&path));
        assert!(!path.join("index.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn loading_missing_index_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = FlatIndex::load(&dir.path().join("nothing"));
        assert!(matches!(result, Err(IndexError::IndexNotFound(_))));
        Ok(())
    }

    #[test]
    fn chunk_ids_are_stable() -> Result<(), IndexError> {
        let first = sample_index(DistanceMetric::L2)?;
        let second = sample_index(DistanceMetric::L2)?;
        let first_ids: Vec<_> = first.entries().iter().map(|e| e.id.clone()).collect();
        let second_ids: Vec<_> = second.entries().iter().map(|e| e.id.clone()).collect();
        assert_eq!(first_ids, second_ids);
        assert_ne!(first_ids[0], first_ids[2]);
        Ok(())
    }
}
