use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_retrieval_core::{
    digest_file, CharacterNgramEmbedder, DistanceMetric, Embedder, OllamaConfig, OllamaEmbedder,
    PersistMode, PipelineOptions, RetrievalPipeline, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_OLLAMA_DIMENSIONS, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory that receives uploaded PDFs
    #[arg(long, env = "PDF_STORAGE_DIR", default_value = "pdfs")]
    storage_dir: PathBuf,

    /// Directory of the persisted vector index
    #[arg(long, env = "VECTOR_INDEX_PATH", default_value = "vectorstore/db_faiss")]
    index_path: PathBuf,

    /// Embedding backend
    #[arg(long, env = "EMBEDDING_BACKEND", value_enum, default_value_t = Backend::Ngram)]
    embedder: Backend,

    /// Ollama embedding model
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_OLLAMA_MODEL)]
    embedding_model: String,

    /// Vector size; defaults to the backend's native size
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    /// What indexing does with an existing index
    #[arg(long, env = "INDEX_PERSIST_MODE", value_enum, default_value_t = Persist::Replace)]
    persist_mode: Persist,

    /// Distance used for similarity search
    #[arg(long, env = "INDEX_METRIC", value_enum, default_value_t = Metric::L2)]
    metric: Metric,

    /// Maximum chunk length in characters
    #[arg(long, env = "CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by neighbouring chunks
    #[arg(long, env = "CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Copy a local PDF into the storage directory.
    Upload {
        #[arg(long)]
        file: PathBuf,
    },
    /// Index a PDF that is already stored.
    Index {
        #[arg(long)]
        path: PathBuf,
    },
    /// Upload a local PDF and index it.
    Ingest {
        #[arg(long)]
        file: PathBuf,
    },
    /// Retrieve chunks of one source file matching a query.
    Query {
        #[arg(long)]
        query: String,
        /// File name the chunks must come from, e.g. `manual.pdf`.
        #[arg(long)]
        source: String,
        /// Number of nearest chunks fetched before the source filter.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// List stored PDFs with size and checksum.
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Ngram,
    Ollama,
}

#[derive(Clone, Copy, ValueEnum)]
enum Persist {
    Replace,
    Merge,
}

#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    L2,
    Cosine,
}

impl Cli {
    fn options(&self, top_k: usize) -> PipelineOptions {
        PipelineOptions {
            storage_dir: self.storage_dir.clone(),
            index_path: self.index_path.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k,
            persist_mode: match self.persist_mode {
                Persist::Replace => PersistMode::Replace,
                Persist::Merge => PersistMode::Merge,
            },
            metric: match self.metric {
                Metric::L2 => DistanceMetric::L2,
                Metric::Cosine => DistanceMetric::Cosine,
            },
        }
    }

    fn embedder(&self) -> anyhow::Result<Box<dyn Embedder>> {
        Ok(match self.embedder {
            Backend::Ngram => Box::new(CharacterNgramEmbedder::new(
                self.embedding_dimensions
                    .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
            )),
            Backend::Ollama => Box::new(
                OllamaEmbedder::new(OllamaConfig {
                    base_url: self.ollama_url.clone(),
                    model: self.embedding_model.clone(),
                    dimensions: self.embedding_dimensions.unwrap_or(DEFAULT_OLLAMA_DIMENSIONS),
                    ..OllamaConfig::default()
                })
                .context("failed to configure ollama embedder")?,
            ),
        })
    }
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let top_k = match &cli.command {
        Command::Query { top_k, .. } => *top_k,
        _ => PipelineOptions::default().top_k,
    };

    let embedder = cli.embedder()?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        model = embedder.model_id(),
        "pdf-retrieval boot"
    );
    let pipeline = RetrievalPipeline::new(&cli.options(top_k), embedder)?;

    match cli.command {
        Command::Upload { file } => {
            let stored = pipeline
                .storage()
                .store_file(&file)
                .with_context(|| format!("failed to store {}", file.display()))?;
            println!("stored {}", stored.display());
        }
        Command::Index { path } => {
            let index = pipeline
                .index_pdf(&path)
                .with_context(|| format!("failed to index {}", path.display()))?;
            println!(
                "{} chunks indexed into {} at {}",
                index.len(),
                pipeline.store().index_path().display(),
                index.built_at().to_rfc3339()
            );
        }
        Command::Ingest { file } => {
            let stored = pipeline
                .storage()
                .store_file(&file)
                .with_context(|| format!("failed to store {}", file.display()))?;
            let index = pipeline
                .index_pdf(&stored)
                .with_context(|| format!("failed to index {}", stored.display()))?;
            println!("{} chunks indexed from {}", index.len(), stored.display());
        }
        Command::Query { query, source, top_k } => {
            let hits = pipeline
                .store()
                .query_with_scores(&query, &source, top_k)
                .context("query failed")?;

            println!("query: {query}");
            if hits.is_empty() {
                println!("no chunks from {source} among the {top_k} nearest");
            }
            for hit in hits {
                let page = hit
                    .chunk
                    .page()
                    .map(|page| page.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let start = hit
                    .chunk
                    .start_index()
                    .map(|start| start.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "[{}] page={page} start_index={start} distance={:.4}",
                    hit.chunk.source().unwrap_or_default(),
                    hit.distance
                );
                println!("{}", hit.chunk.text);
            }
        }
        Command::List => {
            for path in pipeline.storage().list() {
                let size = std::fs::metadata(&path)
                    .map(|meta| meta.len())
                    .unwrap_or_default();
                let checksum = digest_file(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                println!("{}  {size} bytes  sha256={checksum}", path.display());
            }
        }
    }

    Ok(())
}
