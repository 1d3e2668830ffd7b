use crate::chunking::{ChunkingConfig, RecursiveCharacterSplitter};
use crate::embeddings::Embedder;
use crate::index::FlatIndex;
use crate::ingest::PdfStorage;
use crate::loader::{LopdfLoader, PdfLoader};
use crate::models::{Chunk, Document, PipelineOptions};
use crate::store::IndexStore;
use crate::{IngestError, PipelineError};
use std::path::{Path, PathBuf};
use tracing::info;

/// Upload → load → split → embed/index, and the separate query path.
pub struct RetrievalPipeline<E: Embedder, L: PdfLoader = LopdfLoader> {
    storage: PdfStorage,
    loader: L,
    splitter: RecursiveCharacterSplitter,
    store: IndexStore<E>,
    top_k: usize,
}

impl<E: Embedder> RetrievalPipeline<E, LopdfLoader> {
    pub fn new(options: &PipelineOptions, embedder: E) -> Result<Self, PipelineError> {
        Self::with_loader(options, embedder, LopdfLoader)
    }
}

impl<E: Embedder, L: PdfLoader> RetrievalPipeline<E, L> {
    pub fn with_loader(
        options: &PipelineOptions,
        embedder: E,
        loader: L,
    ) -> Result<Self, PipelineError> {
        let splitter = RecursiveCharacterSplitter::new(ChunkingConfig::from(options))?;
        let store = IndexStore::new(embedder, &options.index_path)
            .with_metric(options.metric)
            .with_persist_mode(options.persist_mode);

        Ok(Self {
            storage: PdfStorage::new(&options.storage_dir),
            loader,
            splitter,
            store,
            top_k: options.top_k,
        })
    }

    pub fn storage(&self) -> &PdfStorage {
        &self.storage
    }

    pub fn store(&self) -> &IndexStore<E> {
        &self.store
    }

    pub fn upload(&self, payload: &[u8], filename: &str) -> Result<PathBuf, PipelineError> {
        Ok(self.storage.store(payload, filename)?)
    }

    pub fn load_pdf(&self, path: &Path) -> Result<Vec<Document>, PipelineError> {
        Ok(self.loader.load(path)?)
    }

    pub fn create_chunks(&self, documents: &[Document], file_name: &str) -> Vec<Chunk> {
        self.splitter.split(documents, file_name)
    }

    /// Loads the PDF at `path`, tags its chunks with the file name, and
    /// rebuilds the persisted index from them.
    pub fn index_pdf(&self, path: &Path) -> Result<FlatIndex, PipelineError> {
        let documents = self.load_pdf(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
        let chunks = self.create_chunks(&documents, file_name);

        info!(
            path = %path.display(),
            pages = documents.len(),
            chunk_count = chunks.len(),
            "indexing pdf"
        );
        Ok(self.store.index_documents(&chunks)?)
    }

    pub fn ingest(&self, payload: &[u8], filename: &str) -> Result<FlatIndex, PipelineError> {
        let path = self.upload(payload, filename)?;
        self.index_pdf(&path)
    }

    pub fn retrieve_docs(&self, query: &str, file_name: &str) -> Result<Vec<Chunk>, PipelineError> {
        Ok(self.store.query(query, file_name, self.top_k)?)
    }
}
