/// Text embedding backends.
///
/// The ranker only depends on [`TextEmbedder`]. Production wires in [`FastEmbedder`]
/// (a pretrained sentence-embedding model run through fastembed/ONNX); tests and offline runs
/// use [`HashEmbedder`], which needs no model download and is fully deterministic.
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::RecommendError;

/// Capability: text in, fixed-length vector out, batched.
///
/// `embed_batch` must return exactly one vector per input, in input order.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Identifier of the model, used in logs and health output.
    fn model_id(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecommendError>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RecommendError> {
        self.embed_batch(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RecommendError::Embedding("empty embedding result".to_string()))
    }
}

/// Pretrained models supported by [`FastEmbedder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingModelChoice {
    AllMiniLmL6V2,
    AllMiniLmL12V2,
    BgeSmallEnV15,
    ParaphraseMultilingualMpnetBaseV2,
    NomicEmbedTextV15,
}

impl EmbeddingModelChoice {
    pub fn name(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-minilm-l6-v2",
            Self::AllMiniLmL12V2 => "all-minilm-l12-v2",
            Self::BgeSmallEnV15 => "bge-small-en-v1.5",
            Self::ParaphraseMultilingualMpnetBaseV2 => "paraphrase-multilingual-mpnet-base-v2",
            Self::NomicEmbedTextV15 => "nomic-embed-text-v1.5",
        }
    }

    fn fastembed_model(self) -> fastembed::EmbeddingModel {
        match self {
            Self::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
            Self::AllMiniLmL12V2 => fastembed::EmbeddingModel::AllMiniLML12V2,
            Self::BgeSmallEnV15 => fastembed::EmbeddingModel::BGESmallENV15,
            Self::ParaphraseMultilingualMpnetBaseV2 => {
                fastembed::EmbeddingModel::ParaphraseMLMpnetBaseV2
            }
            Self::NomicEmbedTextV15 => fastembed::EmbeddingModel::NomicEmbedTextV15,
        }
    }

    /// nomic-embed-text expects task-prefixed inputs; the sentence-transformers models do not.
    fn query_prefix(self) -> &'static str {
        match self {
            Self::NomicEmbedTextV15 => "search_query: ",
            _ => "",
        }
    }

    fn document_prefix(self) -> &'static str {
        match self {
            Self::NomicEmbedTextV15 => "search_document: ",
            _ => "",
        }
    }
}

impl FromStr for EmbeddingModelChoice {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let choice = match s.trim().to_ascii_lowercase().as_str() {
            "all-minilm-l6-v2" => Self::AllMiniLmL6V2,
            "all-minilm-l12-v2" => Self::AllMiniLmL12V2,
            "bge-small-en-v1.5" => Self::BgeSmallEnV15,
            "paraphrase-multilingual-mpnet-base-v2" => Self::ParaphraseMultilingualMpnetBaseV2,
            "nomic-embed-text-v1.5" => Self::NomicEmbedTextV15,
            other => {
                return Err(RecommendError::Configuration(format!(
                    "unsupported embedding model: '{other}'"
                )))
            }
        };
        Ok(choice)
    }
}

#[derive(Debug, Clone)]
pub struct FastEmbedderOptions {
    pub model: EmbeddingModelChoice,
    /// Inputs longer than this many tokens are truncated by the tokenizer.
    pub max_length: usize,
    pub cache_dir: Option<PathBuf>,
}

impl Default for FastEmbedderOptions {
    fn default() -> Self {
        Self {
            model: EmbeddingModelChoice::AllMiniLmL6V2,
            max_length: 512,
            cache_dir: None,
        }
    }
}

/// Wraps fastembed's `TextEmbedding` model.
///
/// Inference is synchronous and CPU-bound, so every call is dispatched with
/// `tokio::task::spawn_blocking`.
pub struct FastEmbedder {
    model: Arc<fastembed::TextEmbedding>,
    choice: EmbeddingModelChoice,
}

impl FastEmbedder {
    /// Load the model, downloading it on first run.
    ///
    /// A model that cannot be loaded is a configuration error: the service must not start
    /// without its embedder.
    pub async fn new(options: FastEmbedderOptions) -> Result<Self, RecommendError> {
        let choice = options.model;
        let model = tokio::task::spawn_blocking(move || {
            let mut init = fastembed::InitOptions::new(choice.fastembed_model())
                .with_max_length(options.max_length)
                .with_show_download_progress(true);
            if let Some(dir) = options.cache_dir {
                init = init.with_cache_dir(dir);
            }
            fastembed::TextEmbedding::try_new(init)
        })
        .await
        .map_err(|e| RecommendError::Configuration(format!("spawn_blocking join error: {e}")))?
        .map_err(|e| {
            RecommendError::Configuration(format!(
                "embedding model {} failed to initialize: {e}",
                choice.name()
            ))
        })?;

        Ok(Self {
            model: Arc::new(model),
            choice,
        })
    }

    async fn embed_prefixed(
        &self,
        texts: Vec<String>,
        batch_size: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, RecommendError> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.embed(texts, batch_size))
            .await
            .map_err(|e| RecommendError::Embedding(format!("spawn_blocking join error: {e}")))?
            .map_err(|e| RecommendError::Embedding(format!("inference failed: {e}")))
    }
}

#[async_trait]
impl TextEmbedder for FastEmbedder {
    fn model_id(&self) -> &str {
        self.choice.name()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecommendError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let prefix = self.choice.document_prefix();
        let prefixed: Vec<String> = texts.iter().map(|t| format!("{prefix}{t}")).collect();
        self.embed_prefixed(prefixed, Some(32)).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RecommendError> {
        let prefixed = vec![format!("{}{query}", self.choice.query_prefix())];
        self.embed_prefixed(prefixed, None)
            .await?
            .pop()
            .ok_or_else(|| RecommendError::Embedding("empty embedding result".to_string()))
    }
}

/// Deterministic feature-hashing embedder.
///
/// Lower-cased alphanumeric words and adjacent word pairs are hashed with SHA-256 into
/// `dimensions` signed buckets and the result is L2-normalized. Texts that share words point
/// in similar directions, which is enough to exercise re-ranking without a model.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 384;

    pub fn new(dimensions: usize) -> Result<Self, RecommendError> {
        if dimensions == 0 {
            return Err(RecommendError::Configuration(
                "hash embedder dimensions must be at least 1".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut vector = vec![0.0f32; self.dimensions];
        for word in &words {
            self.accumulate(&mut vector, word, 1.0);
        }
        for pair in words.windows(2) {
            self.accumulate(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: Self::DEFAULT_DIMENSIONS,
        }
    }
}

#[async_trait]
impl TextEmbedder for HashEmbedder {
    fn model_id(&self) -> &str {
        "feature-hash"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecommendError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}
