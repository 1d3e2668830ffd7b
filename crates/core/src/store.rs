use crate::embeddings::Embedder;
use crate::index::FlatIndex;
use crate::models::{Chunk, DistanceMetric, PersistMode, SearchHit};
use crate::IndexError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Embeds chunks, owns the persisted index at `index_path`, and answers
/// source-filtered similarity queries.
///
/// The embedder is created once by the caller and lives as long as the store.
pub struct IndexStore<E: Embedder> {
    embedder: E,
    index_path: PathBuf,
    metric: DistanceMetric,
    persist_mode: PersistMode,
}

impl<E: Embedder> IndexStore<E> {
    pub fn new(embedder: E, index_path: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            index_path: index_path.into(),
            metric: DistanceMetric::default(),
            persist_mode: PersistMode::default(),
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_persist_mode(mut self, persist_mode: PersistMode) -> Self {
        self.persist_mode = persist_mode;
        self
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn persist_mode(&self) -> PersistMode {
        self.persist_mode
    }

    pub fn exists(&self) -> bool {
        FlatIndex::exists(&self.index_path)
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let vector = self.embedder.embed(text)?;
        self.check_dimensions(vector.len())?;
        Ok(vector)
    }

    /// Embeds `chunks`, builds the index, persists it and returns it.
    ///
    /// With [`PersistMode::Replace`] any previously persisted content is
    /// discarded, so chunks of earlier files stop being retrievable. With
    /// [`PersistMode::Merge`] the persisted entries of other sources are kept.
    /// An empty `chunks` slice is rejected and leaves the persisted index alone.
    pub fn index_documents(&self, chunks: &[Chunk]) -> Result<FlatIndex, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyInput);
        }

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        for vector in &embeddings {
            self.check_dimensions(vector.len())?;
        }

        let mut index = match self.persist_mode {
            PersistMode::Merge if self.exists() => {
                let mut existing = self.load()?;
                let incoming: BTreeSet<&str> = chunks.iter().filter_map(Chunk::source).collect();
                let removed = existing.retain(|chunk| {
                    chunk
                        .source()
                        .map_or(true, |source| !incoming.contains(source))
                });
                debug!(removed, kept = existing.len(), "merging into persisted index");
                existing
            }
            _ => FlatIndex::new(
                self.embedder.model_id(),
                self.embedder.dimensions(),
                self.metric,
            ),
        };

        index.add(chunks.to_vec(), embeddings)?;
        index.save(&self.index_path)?;

        info!(
            path = %self.index_path.display(),
            added = chunks.len(),
            total = index.len(),
            mode = ?self.persist_mode,
            "persisted index"
        );
        Ok(index)
    }

    /// Loads the persisted index, refusing one built by a different model or
    /// for a different distance metric.
    pub fn load(&self) -> Result<FlatIndex, IndexError> {
        let index = FlatIndex::load(&self.index_path)?;

        if index.model_id() != self.embedder.model_id() {
            return Err(IndexError::ModelMismatch {
                persisted: index.model_id().to_string(),
                configured: self.embedder.model_id().to_string(),
            });
        }
        if index.dimensions() != self.embedder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: index.dimensions(),
            });
        }
        if index.metric() != self.metric {
            return Err(IndexError::MetricMismatch {
                persisted: index.metric(),
                configured: self.metric,
            });
        }

        Ok(index)
    }

    /// Top-`k` chunks by similarity across the whole index, then only those
    /// whose `source` equals `source_filter`. The result may be shorter than
    /// `k`, or empty, even when more chunks of that source exist further down
    /// the ranking.
    pub fn query(&self, text: &str, source_filter: &str, k: usize) -> Result<Vec<Chunk>, IndexError> {
        Ok(self
            .query_with_scores(text, source_filter, k)?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    pub fn query_with_scores(
        &self,
        text: &str,
        source_filter: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let index = self.load()?;
        let query_vector = self.embed(text)?;

        let nearest = index.search(&query_vector, k)?;
        let retrieved = nearest.len();
        let hits: Vec<SearchHit> = nearest
            .into_iter()
            .filter(|hit| hit.chunk.source() == Some(source_filter))
            .collect();

        info!(
            source = source_filter,
            k,
            retrieved,
            hits = hits.len(),
            "query answered"
        );
        Ok(hits)
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), IndexError> {
        let expected = self.embedder.dimensions();
        if actual != expected {
            return Err(IndexError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }
}
