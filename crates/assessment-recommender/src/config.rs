use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use recommender_core::embedding::{EmbeddingModelChoice, FastEmbedderOptions, HashEmbedder};
use recommender_core::lexical::Bm25Params;
use recommender_core::ranker::RankerSettings;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Pretrained sentence-embedding model via fastembed.
    FastEmbed,
    /// Deterministic feature hashing, no model download.
    Hash,
}

impl FromStr for EmbedderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fastembed" => Ok(Self::FastEmbed),
            "hash" => Ok(Self::Hash),
            other => Err(format!("expected 'fastembed' or 'hash', got '{other}'")),
        }
    }
}

/// Application configuration loaded explicitly from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file holding the assessment catalog.
    pub catalog_path: PathBuf,
    pub ranker: RankerSettings,
    pub embedder: EmbedderKind,
    pub fastembed: FastEmbedderOptions,
    pub hash_dimensions: usize,
    /// Serve the HTTP API on this address instead of MCP.
    pub http_addr: Option<String>,
    /// Serve MCP over TCP on this address instead of stdio.
    pub mcp_tcp_addr: Option<String>,
}

impl Config {
    /// Required:
    /// - `ASSESSMENT_CATALOG_PATH`: path to the JSON catalog
    ///
    /// Optional:
    /// - `RECOMMENDER_SHORTLIST_SIZE` (default: 20), `RECOMMENDER_RESULT_LIMIT` (default: 10)
    /// - `RECOMMENDER_EMBEDDER`: `fastembed` (default) or `hash`
    /// - `RECOMMENDER_EMBEDDING_MODEL` (default: "all-minilm-l6-v2")
    /// - `RECOMMENDER_EMBEDDING_MAX_LENGTH` (default: 512), `FASTEMBED_CACHE_DIR`
    /// - `RECOMMENDER_HASH_DIMENSIONS` (default: 384)
    /// - `RECOMMENDER_BM25_K1`, `RECOMMENDER_BM25_B`, `RECOMMENDER_BM25_EPSILON`
    /// - `RECOMMENDER_MIN_LEXICAL_SCORE`, `RECOMMENDER_MIN_SIMILARITY`
    /// - `RECOMMENDER_HTTP_ADDR`, `MCP_TCP_LISTEN_ADDR`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let catalog_path = lookup("ASSESSMENT_CATALOG_PATH").ok_or_else(|| {
            AppError::Config("ASSESSMENT_CATALOG_PATH environment variable is required".to_string())
        })?;
        let catalog_path = PathBuf::from(catalog_path);
        if !catalog_path.is_file() {
            return Err(AppError::Config(format!(
                "required file not found: {}",
                catalog_path.display()
            )));
        }

        let defaults = RankerSettings::default();
        let bm25_defaults = Bm25Params::default();
        let ranker = RankerSettings {
            shortlist_size: parse_or(
                &lookup,
                "RECOMMENDER_SHORTLIST_SIZE",
                defaults.shortlist_size,
            )?,
            result_limit: parse_or(&lookup, "RECOMMENDER_RESULT_LIMIT", defaults.result_limit)?,
            bm25: Bm25Params {
                k1: parse_or(&lookup, "RECOMMENDER_BM25_K1", bm25_defaults.k1)?,
                b: parse_or(&lookup, "RECOMMENDER_BM25_B", bm25_defaults.b)?,
                epsilon: parse_or(&lookup, "RECOMMENDER_BM25_EPSILON", bm25_defaults.epsilon)?,
            },
            min_lexical_score: parse_opt(&lookup, "RECOMMENDER_MIN_LEXICAL_SCORE")?,
            min_similarity: parse_opt(&lookup, "RECOMMENDER_MIN_SIMILARITY")?,
        };
        ranker.validate()?;

        let fastembed_defaults = FastEmbedderOptions::default();
        let fastembed = FastEmbedderOptions {
            model: parse_or(
                &lookup,
                "RECOMMENDER_EMBEDDING_MODEL",
                fastembed_defaults.model,
            )?,
            max_length: parse_or(
                &lookup,
                "RECOMMENDER_EMBEDDING_MAX_LENGTH",
                fastembed_defaults.max_length,
            )?,
            cache_dir: lookup("FASTEMBED_CACHE_DIR").map(PathBuf::from),
        };

        Ok(Self {
            catalog_path,
            ranker,
            embedder: parse_or(&lookup, "RECOMMENDER_EMBEDDER", EmbedderKind::FastEmbed)?,
            fastembed,
            hash_dimensions: parse_or(
                &lookup,
                "RECOMMENDER_HASH_DIMENSIONS",
                HashEmbedder::DEFAULT_DIMENSIONS,
            )?,
            http_addr: lookup("RECOMMENDER_HTTP_ADDR").filter(|s| !s.trim().is_empty()),
            mcp_tcp_addr: lookup("MCP_TCP_LISTEN_ADDR").filter(|s| !s.trim().is_empty()),
        })
    }

    pub fn embedding_model_name(&self) -> &'static str {
        match self.embedder {
            EmbedderKind::FastEmbed => self.fastembed.model.name(),
            EmbedderKind::Hash => "feature-hash",
        }
    }
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(name)
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| AppError::Config(format!("invalid {name}='{raw}': {e}")))
        })
        .transpose()
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(parse_opt(lookup, name)?.unwrap_or(default))
}
