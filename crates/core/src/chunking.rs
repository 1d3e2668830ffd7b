use crate::error::IngestError;
use crate::models::{Chunk, Document, PipelineOptions, META_SOURCE, META_START_INDEX};
use regex::Regex;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Paragraph, line, sentence, word, then a hard cut between characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Maximum number of characters carried over between neighbouring chunks.
    pub chunk_overlap: usize,
    /// Separators in priority order. An empty separator splits between characters.
    pub separators: Vec<String>,
    pub separators_are_regex: bool,
    /// Keep each separator attached to the start of the piece that follows it.
    pub keep_separator: bool,
    pub strip_whitespace: bool,
    pub add_start_index: bool,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separators.is_empty() {
            return Err(IngestError::InvalidChunkConfig(
                "at least one separator is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            separators_are_regex: false,
            keep_separator: true,
            strip_whitespace: true,
            add_start_index: true,
        }
    }
}

impl From<&PipelineOptions> for ChunkingConfig {
    fn from(value: &PipelineOptions) -> Self {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// Splits text on the largest separator present, merges the pieces back into
/// windows of at most `chunk_size` characters, and recurses with the next
/// separator into any piece that is still too long.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    config: ChunkingConfig,
    /// `None` stands for the empty separator.
    patterns: Vec<Option<Regex>>,
}

impl RecursiveCharacterSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;

        let patterns = config
            .separators
            .iter()
            .map(|separator| {
                if separator.is_empty() {
                    Ok(None)
                } else if config.separators_are_regex {
                    Regex::new(separator).map(Some)
                } else {
                    Regex::new(&regex::escape(separator)).map(Some)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { config, patterns })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_from(text, 0)
    }

    /// Splits every document and stamps each chunk with its `start_index` and
    /// `source = source_name`, replacing whatever source the loader recorded.
    pub fn split(&self, documents: &[Document], source_name: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for document in documents {
            let mut cursor = 0usize;
            let mut previous_len = 0usize;

            for text in self.split_text(&document.text) {
                let mut metadata = document.metadata.clone();
                if self.config.add_start_index {
                    let from = (cursor + previous_len).saturating_sub(self.config.chunk_overlap);
                    cursor = find_char_offset(&document.text, &text, from);
                    previous_len = text.chars().count();
                    metadata.insert(META_START_INDEX.to_string(), (cursor as u64).into());
                }
                metadata.insert(META_SOURCE.to_string(), source_name.into());
                chunks.push(Chunk { text, metadata });
            }
        }

        debug!(
            source = source_name,
            documents = documents.len(),
            chunks = chunks.len(),
            "split documents"
        );
        chunks
    }

    fn split_from(&self, text: &str, from: usize) -> Vec<String> {
        let last = self.patterns.len() - 1;
        let mut chosen = last;
        let mut next = None;

        for index in from..self.patterns.len() {
            match &self.patterns[index] {
                None => {
                    chosen = index;
                    break;
                }
                Some(pattern) if pattern.is_match(text) => {
                    chosen = index;
                    if index < last {
                        next = Some(index + 1);
                    }
                    break;
                }
                Some(_) => {}
            }
        }

        let pieces = self.split_on(text, chosen);
        let joiner = if self.config.keep_separator || self.config.separators_are_regex {
            ""
        } else {
            self.config.separators[chosen].as_str()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if piece.chars().count() < self.config.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, joiner));
                fitting.clear();
            }
            match next {
                Some(next) => chunks.extend(self.split_from(piece, next)),
                None => chunks.push(piece.to_string()),
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, joiner));
        }

        chunks
    }

    fn split_on<'a>(&self, text: &'a str, separator: usize) -> Vec<&'a str> {
        let Some(pattern) = &self.patterns[separator] else {
            return text
                .char_indices()
                .map(|(start, ch)| &text[start..start + ch.len_utf8()])
                .collect();
        };

        let pieces: Vec<&str> = if self.config.keep_separator {
            let mut pieces = Vec::new();
            let mut start = 0;
            for found in pattern.find_iter(text) {
                if found.start() == found.end() {
                    continue;
                }
                pieces.push(&text[start..found.start()]);
                start = found.start();
            }
            pieces.push(&text[start..]);
            pieces
        } else {
            pattern.split(text).collect()
        };

        pieces.into_iter().filter(|piece| !piece.is_empty()).collect()
    }

    fn merge(&self, pieces: &[&str], joiner: &str) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let joiner_len = joiner.chars().count();

        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = piece.chars().count();
            let gap = if window.is_empty() { 0 } else { joiner_len };

            if total + len + gap > size {
                if total > size {
                    warn!(length = total, chunk_size = size, "created a chunk longer than chunk_size");
                }
                if !window.is_empty() {
                    if let Some(text) = self.join(&window, joiner) {
                        merged.push(text);
                    }

                    loop {
                        let gap = if window.is_empty() { 0 } else { joiner_len };
                        let must_shrink = total > overlap || (total + len + gap > size && total > 0);
                        if !must_shrink {
                            break;
                        }
                        let trailing = if window.len() > 1 { joiner_len } else { 0 };
                        let Some(front) = window.pop_front() else {
                            break;
                        };
                        total = total.saturating_sub(front.chars().count() + trailing);
                    }
                }
            }

            window.push_back(piece);
            total += len + if window.len() > 1 { joiner_len } else { 0 };
        }

        if let Some(text) = self.join(&window, joiner) {
            merged.push(text);
        }
        merged
    }

    fn join(&self, window: &VecDeque<&str>, joiner: &str) -> Option<String> {
        let joined = window.iter().copied().collect::<Vec<_>>().join(joiner);
        let joined = if self.config.strip_whitespace {
            joined.trim().to_string()
        } else {
            joined
        };
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

/// Character offset of the first occurrence of `needle` in `haystack` at or
/// after character `from`.
fn find_char_offset(haystack: &str, needle: &str, from: usize) -> usize {
    let byte_from = haystack
        .char_indices()
        .nth(from)
        .map(|(byte, _)| byte)
        .unwrap_or(haystack.len());

    let found = haystack[byte_from..]
        .find(needle)
        .map(|position| byte_from + position)
        .or_else(|| haystack.find(needle));

    match found {
        Some(byte) => haystack[..byte].chars().count(),
        None => from,
    }
}

/// Splits loaded pages into chunks tagged with `file_name`.
pub fn create_chunks(
    documents: &[Document],
    file_name: &str,
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    Ok(RecursiveCharacterSplitter::new(config)?.split(documents, file_name))
}
