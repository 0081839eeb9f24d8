/// Two-stage retrieval: BM25 shortlist over the whole catalog, then semantic re-ranking of the
/// shortlist by cosine similarity between the query embedding and each candidate's
/// name-and-category text.
///
/// Re-ranking only reorders the shortlist. A record the lexical pass did not surface can never
/// appear in the output.
use std::sync::Arc;

use tracing::debug;

use crate::catalog::{AssessmentRecord, Catalog};
use crate::embedding::TextEmbedder;
use crate::error::RecommendError;
use crate::lexical::{tokenize, Bm25Params, LexicalIndex, Shortlisted};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankerSettings {
    /// K: how many records the lexical pass hands to the semantic pass.
    pub shortlist_size: usize,
    /// N: maximum number of ranked results.
    pub result_limit: usize,
    pub bm25: Bm25Params,
    /// When set, a query whose best BM25 score is at or below this floor ranks nothing.
    pub min_lexical_score: Option<f64>,
    /// When set, a query whose best similarity is below this floor ranks nothing.
    pub min_similarity: Option<f32>,
}

impl Default for RankerSettings {
    fn default() -> Self {
        Self {
            shortlist_size: 20,
            result_limit: 10,
            bm25: Bm25Params::default(),
            min_lexical_score: None,
            min_similarity: None,
        }
    }
}

impl RankerSettings {
    pub fn validate(&self) -> Result<(), RecommendError> {
        if self.result_limit == 0 {
            return Err(RecommendError::Configuration(
                "result limit must be at least 1".to_string(),
            ));
        }
        if self.shortlist_size < self.result_limit {
            return Err(RecommendError::Configuration(format!(
                "shortlist size ({}) must be at least the result limit ({})",
                self.shortlist_size, self.result_limit
            )));
        }
        self.bm25.validate()?;
        if self.min_lexical_score.is_some_and(|floor| !floor.is_finite()) {
            return Err(RecommendError::Configuration(
                "minimum lexical score must be a finite number".to_string(),
            ));
        }
        if self.min_similarity.is_some_and(|floor| !floor.is_finite()) {
            return Err(RecommendError::Configuration(
                "minimum similarity must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

/// A shortlisted record with both of its scores. Lives for one request only.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate<'a> {
    pub record: &'a AssessmentRecord,
    pub lexical_rank: usize,
    pub lexical_score: f64,
    pub semantic_score: f32,
}

/// Cosine similarity; 0 for zero-magnitude vectors or mismatched dimensions.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub struct HybridRanker {
    catalog: Arc<Catalog>,
    index: LexicalIndex,
    embedder: Arc<dyn TextEmbedder>,
    settings: RankerSettings,
}

impl HybridRanker {
    /// Validate settings and build the lexical index. All failures here are configuration
    /// errors.
    pub fn new(
        catalog: Arc<Catalog>,
        embedder: Arc<dyn TextEmbedder>,
        settings: RankerSettings,
    ) -> Result<Self, RecommendError> {
        settings.validate()?;
        let index = LexicalIndex::from_catalog(&catalog, settings.bm25)?;
        Ok(Self {
            catalog,
            index,
            embedder,
            settings,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn embedder(&self) -> &dyn TextEmbedder {
        self.embedder.as_ref()
    }

    /// The lexical shortlist for a query, best first.
    pub fn shortlist(&self, query: &str) -> Result<Vec<Shortlisted>, RecommendError> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Err(RecommendError::EmptyQuery);
        }
        Ok(self.index.shortlist(&tokens, self.settings.shortlist_size))
    }

    /// Rank the catalog for a query and return at most `result_limit` candidates, most similar
    /// first. Equal similarities keep lexical order.
    pub async fn rank(&self, query: &str) -> Result<Vec<ScoredCandidate<'_>>, RecommendError> {
        let shortlist = self.shortlist(query)?;

        if let Some(floor) = self.settings.min_lexical_score {
            let best = shortlist.first().map(|s| s.score).unwrap_or(0.0);
            if best <= floor {
                debug!(best, floor, "no lexical overlap above floor");
                return Ok(Vec::new());
            }
        }

        let query_vector = self.embedder.embed_query(query).await?;

        let projections: Vec<String> = shortlist
            .iter()
            .map(|s| self.catalog.records()[s.index].ranking_projection())
            .collect();
        let vectors = self.embedder.embed_batch(&projections).await?;
        if vectors.len() != shortlist.len() {
            return Err(RecommendError::Embedding(format!(
                "embedding count mismatch: expected {}, got {}",
                shortlist.len(),
                vectors.len()
            )));
        }

        let mut candidates: Vec<ScoredCandidate<'_>> = shortlist
            .iter()
            .zip(&vectors)
            .map(|(s, vector)| ScoredCandidate {
                record: &self.catalog.records()[s.index],
                lexical_rank: s.rank,
                lexical_score: s.score,
                semantic_score: cosine_similarity(&query_vector, vector),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.semantic_score
                .total_cmp(&a.semantic_score)
                .then(a.lexical_rank.cmp(&b.lexical_rank))
        });

        if let Some(floor) = self.settings.min_similarity {
            let best = candidates.first().map(|c| c.semantic_score).unwrap_or(0.0);
            if best < floor {
                debug!(best, floor, "no candidate similar enough");
                return Ok(Vec::new());
            }
        }

        candidates.truncate(self.settings.result_limit);
        debug!(
            shortlist = shortlist.len(),
            ranked = candidates.len(),
            "query ranked"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::embedding::HashEmbedder;

    fn record(name: &str, test_type: &[&str]) -> AssessmentRecord {
        AssessmentRecord {
            name: name.to_string(),
            url: format!(
                "https://example.com/{}",
                name.to_lowercase().replace(' ', "-")
            ),
            description: None,
            test_type: test_type.iter().map(|t| t.to_string()).collect(),
            duration: Some(30),
            remote_testing: true,
            adaptive_irt: false,
        }
    }

    fn catalog(records: Vec<AssessmentRecord>) -> Arc<Catalog> {
        Arc::new(Catalog::new(records).expect("valid catalog"))
    }

    /// Returns fixed vectors per text, unknown texts map to the zero vector.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl TextEmbedder for TableEmbedder {
        fn model_id(&self) -> &str {
            "table"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecommendError> {
            Ok(texts
                .iter()
                .map(|t| self.table.get(t).cloned().unwrap_or_else(|| vec![0.0, 0.0]))
                .collect())
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl TextEmbedder for ShortEmbedder {
        fn model_id(&self) -> &str {
            "short"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecommendError> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
        }

        async fn embed_query(&self, _query: &str) -> Result<Vec<f32>, RecommendError> {
            Ok(vec![1.0])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl TextEmbedder for FailingEmbedder {
        fn model_id(&self) -> &str {
            "failing"
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RecommendError> {
            Err(RecommendError::Embedding("backend offline".to_string()))
        }
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
    }

    #[test]
    fn settings_require_shortlist_at_least_result_limit() {
        let settings = RankerSettings {
            shortlist_size: 5,
            result_limit: 10,
            ..RankerSettings::default()
        };
        let err = HybridRanker::new(
            catalog(vec![record("A", &[])]),
            Arc::new(HashEmbedder::default()),
            settings,
        )
        .err()
        .expect("K < N must be rejected");
        assert!(matches!(err, RecommendError::Configuration(_)));

        let zero = RankerSettings {
            result_limit: 0,
            ..RankerSettings::default()
        };
        assert!(zero.validate().is_err());
        assert!(RankerSettings::default().validate().is_ok());
    }

    #[test]
    fn settings_reject_invalid_bm25_and_gate_values() {
        let negative_k1 = RankerSettings {
            bm25: Bm25Params {
                k1: -1.0,
                ..Bm25Params::default()
            },
            ..RankerSettings::default()
        };
        let err = HybridRanker::new(
            catalog(vec![record("A", &[]), record("B", &[])]),
            Arc::new(HashEmbedder::default()),
            negative_k1,
        )
        .err()
        .expect("negative k1 must be rejected");
        assert!(matches!(err, RecommendError::Configuration(_)));

        let wide_b = RankerSettings {
            bm25: Bm25Params {
                b: 2.0,
                ..Bm25Params::default()
            },
            ..RankerSettings::default()
        };
        assert!(wide_b.validate().is_err());

        let nan_lexical_floor = RankerSettings {
            min_lexical_score: Some(f64::NAN),
            ..RankerSettings::default()
        };
        assert!(nan_lexical_floor.validate().is_err());

        let nan_similarity_floor = RankerSettings {
            min_similarity: Some(f32::NAN),
            ..RankerSettings::default()
        };
        assert!(nan_similarity_floor.validate().is_err());

        let finite_floors = RankerSettings {
            min_lexical_score: Some(0.0),
            min_similarity: Some(-1.0),
            ..RankerSettings::default()
        };
        assert!(finite_floors.validate().is_ok());
    }

    #[tokio::test]
    async fn semantic_pass_reorders_the_shortlist() {
        // Lexically "Java Basics" wins (shorter document), semantically "Java Advanced" does.
        let records = vec![
            record("Java Basics", &[]),
            record("Java Advanced Programming", &[]),
            record("Sales Negotiation", &[]),
        ];
        let table = HashMap::from([
            ("senior java".to_string(), vec![1.0, 0.0]),
            ("Java Basics".to_string(), vec![0.0, 1.0]),
            ("Java Advanced Programming".to_string(), vec![0.9, 0.1]),
            ("Sales Negotiation".to_string(), vec![0.5, 0.5]),
        ]);
        let ranker = HybridRanker::new(
            catalog(records),
            Arc::new(TableEmbedder { table }),
            RankerSettings {
                shortlist_size: 3,
                result_limit: 3,
                ..RankerSettings::default()
            },
        )
        .expect("ranker builds");

        let shortlist = ranker.shortlist("senior java").expect("shortlist");
        assert_eq!(shortlist[0].index, 0);

        let ranked = ranker.rank("senior java").await.expect("ranks");
        let names: Vec<&str> = ranked.iter().map(|c| c.record.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Java Advanced Programming", "Sales Negotiation", "Java Basics"]
        );
        assert_eq!(ranked[0].lexical_rank, 1);
        assert!(ranked[0].semantic_score > ranked[1].semantic_score);
    }

    #[tokio::test]
    async fn equal_similarity_keeps_lexical_order() {
        let records = vec![
            record("Numerical Reasoning", &[]),
            record("Verbal Reasoning", &[]),
            record("Reasoning", &[]),
        ];
        // Every text maps to the zero vector, so every similarity is 0.
        let ranker = HybridRanker::new(
            catalog(records),
            Arc::new(TableEmbedder {
                table: HashMap::new(),
            }),
            RankerSettings {
                shortlist_size: 3,
                result_limit: 3,
                ..RankerSettings::default()
            },
        )
        .expect("ranker builds");

        let lexical: Vec<usize> = ranker
            .shortlist("reasoning")
            .expect("shortlist")
            .iter()
            .map(|s| s.index)
            .collect();
        let ranked = ranker.rank("reasoning").await.expect("ranks");
        let reranked: Vec<usize> = ranked.iter().map(|c| c.lexical_rank).collect();
        assert_eq!(reranked, vec![0, 1, 2]);
        assert_eq!(
            ranked[0].record.name,
            ranker.catalog().records()[lexical[0]].name
        );
        assert!(ranked.iter().all(|c| c.semantic_score == 0.0));
    }

    #[tokio::test]
    async fn result_limit_and_small_catalog() {
        let records = vec![record("A test", &[]), record("B test", &[])];
        let ranker = HybridRanker::new(
            catalog(records),
            Arc::new(HashEmbedder::default()),
            RankerSettings::default(),
        )
        .expect("ranker builds");
        let ranked = ranker.rank("test").await.expect("ranks");
        assert_eq!(ranked.len(), 2);

        let records = (0..6).map(|i| record(&format!("Test {i}"), &[])).collect();
        let ranker = HybridRanker::new(
            catalog(records),
            Arc::new(HashEmbedder::default()),
            RankerSettings {
                shortlist_size: 4,
                result_limit: 2,
                ..RankerSettings::default()
            },
        )
        .expect("ranker builds");
        assert_eq!(ranker.rank("test").await.expect("ranks").len(), 2);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let ranker = HybridRanker::new(
            catalog(vec![record("A", &[])]),
            Arc::new(HashEmbedder::default()),
            RankerSettings::default(),
        )
        .expect("ranker builds");
        for query in ["", "   ", "\t\n"] {
            assert!(matches!(
                ranker.rank(query).await,
                Err(RecommendError::EmptyQuery)
            ));
        }
    }

    #[tokio::test]
    async fn embedding_failures_are_request_fatal() {
        let ranker = HybridRanker::new(
            catalog(vec![record("A", &[])]),
            Arc::new(FailingEmbedder),
            RankerSettings::default(),
        )
        .expect("ranker builds");
        assert!(matches!(
            ranker.rank("a").await,
            Err(RecommendError::Embedding(_))
        ));

        let ranker = HybridRanker::new(
            catalog(vec![record("A", &[]), record("B", &[])]),
            Arc::new(ShortEmbedder),
            RankerSettings::default(),
        )
        .expect("ranker builds");
        let err = ranker.rank("a").await.unwrap_err();
        assert!(err.to_string().contains("count mismatch"));
    }

    #[tokio::test]
    async fn relevance_gates() {
        let records = vec![
            record("Java Basics", &[]),
            record("Sales Negotiation", &[]),
            record("Verbal Reasoning", &[]),
        ];
        let lexical_gate = HybridRanker::new(
            catalog(records.clone()),
            Arc::new(HashEmbedder::default()),
            RankerSettings {
                min_lexical_score: Some(0.0),
                ..RankerSettings::default()
            },
        )
        .expect("ranker builds");
        assert!(lexical_gate.rank("astronomy").await.expect("ranks").is_empty());
        assert!(!lexical_gate.rank("java").await.expect("ranks").is_empty());

        let similarity_gate = HybridRanker::new(
            catalog(records),
            Arc::new(TableEmbedder {
                table: HashMap::new(),
            }),
            RankerSettings {
                min_similarity: Some(0.1),
                ..RankerSettings::default()
            },
        )
        .expect("ranker builds");
        assert!(similarity_gate.rank("java").await.expect("ranks").is_empty());
    }
}
