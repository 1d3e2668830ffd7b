pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod store;

pub use chunking::{create_chunks, ChunkingConfig, RecursiveCharacterSplitter, DEFAULT_SEPARATORS};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaConfig, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_OLLAMA_DIMENSIONS, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL,
};
pub use error::{IndexError, IngestError, PipelineError};
pub use index::{FlatIndex, IndexEntry, INDEX_FILE_NAME};
pub use ingest::{digest_file, discover_pdf_files, PdfStorage};
pub use loader::{load_pdf, LopdfLoader, PdfLoader};
pub use models::{
    Chunk, DistanceMetric, Document, Metadata, PersistMode, PipelineOptions, SearchHit,
    META_FILE_PATH, META_PAGE, META_SOURCE, META_START_INDEX, META_TOTAL_PAGES,
};
pub use pipeline::RetrievalPipeline;
pub use store::IndexStore;
