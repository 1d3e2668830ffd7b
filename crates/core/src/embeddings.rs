use crate::IndexError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Ollama build of `sentence-transformers/all-MiniLM-L6-v2`.
pub const DEFAULT_OLLAMA_MODEL: &str = "all-minilm";
pub const DEFAULT_OLLAMA_DIMENSIONS: usize = 384;

/// Text to vector backend. The model identity is fixed for the lifetime of
/// the instance, so the same text always maps to the same vector.
pub trait Embedder {
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        (**self).embed_batch(texts)
    }
}

/// Offline embedder hashing lowercase character trigrams into a fixed number
/// of buckets, L2-normalised.
#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    dimensions: usize,
    model_id: String,
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("char-trigram-fnv-{dimensions}"),
        }
    }
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let mut vector = vec![0f32; self.dimensions];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for byte in window.iter().collect::<String>().bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            dimensions: DEFAULT_OLLAMA_DIMENSIONS,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings served by a local Ollama instance through `POST /api/embed`.
pub struct OllamaEmbedder {
    endpoint: Url,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaConfig) -> Result<Self, IndexError> {
        let endpoint = Url::parse(&config.base_url)?.join("api/embed")?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            endpoint,
            model: config.model,
            dimensions: config.dimensions,
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()?;

        if !response.status().is_success() {
            return Err(IndexError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: EmbedResponse = response.json()?;
        self.check_payload(texts.len(), payload.embeddings)
    }

    fn check_payload(
        &self,
        expected: usize,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        if embeddings.len() != expected {
            return Err(IndexError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("expected {expected} embeddings, got {}", embeddings.len()),
            });
        }
        if let Some(wrong) = embeddings.iter().find(|vector| vector.len() != self.dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: wrong.len(),
            });
        }
        Ok(embeddings)
    }
}

impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let mut vectors = self.request(&[text])?;
        vectors.pop().ok_or_else(|| IndexError::BackendResponse {
            backend: "ollama".to_string(),
            details: "empty embedding response".to_string(),
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = texts.len(), "requesting embeddings");
        self.request(texts)
    }
}
