/// The recommendation service: explicitly constructed once, read-only afterwards.
///
/// `Recommender` owns the catalog, the lexical index and the embedder handle. Serving layers
/// hold a [`SharedRecommender`], which starts empty and becomes ready when a fully built
/// `Recommender` is installed.
use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::api::{
    AssessmentDetail, HealthResponse, RecommendParams, Recommendation, TestTypeInfo,
};
use crate::catalog::Catalog;
use crate::embedding::TextEmbedder;
use crate::error::RecommendError;
use crate::filter::RecommendationFilter;
use crate::ranker::{HybridRanker, RankerSettings};

pub struct Recommender {
    ranker: HybridRanker,
}

impl Recommender {
    pub fn new(
        catalog: Arc<Catalog>,
        embedder: Arc<dyn TextEmbedder>,
        settings: RankerSettings,
    ) -> Result<Self, RecommendError> {
        let ranker = HybridRanker::new(catalog, embedder, settings)?;
        info!(
            assessments = ranker.catalog().len(),
            shortlist_size = settings.shortlist_size,
            result_limit = settings.result_limit,
            model = ranker.embedder().model_id(),
            "recommender initialized"
        );
        Ok(Self { ranker })
    }

    pub fn ranker(&self) -> &HybridRanker {
        &self.ranker
    }

    /// Rank, filter and shape results for one request.
    ///
    /// Filters are validated before any ranking work is done. An empty list after filtering is
    /// a valid answer.
    pub async fn recommend(
        &self,
        params: &RecommendParams,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        let filter = RecommendationFilter::from_params(params)?;
        debug!(query = %params.query, ?filter, "recommendation requested");

        let ranked = self.ranker.rank(&params.query).await?;
        let ranked_count = ranked.len();
        let kept = filter.apply(ranked);

        info!(
            ranked = ranked_count,
            returned = kept.len(),
            filtered = !filter.is_unconstrained(),
            "recommendations served"
        );

        Ok(kept
            .into_iter()
            .map(|candidate| Recommendation {
                name: candidate.record.name.clone(),
                url: candidate.record.url.clone(),
                test_type: candidate.record.test_type.clone(),
                duration: candidate.record.duration,
                remote_testing: candidate.record.remote_testing,
                adaptive_irt: candidate.record.adaptive_irt,
                relevance: candidate.semantic_score,
            })
            .collect())
    }

    pub fn get_assessment(&self, url: &str) -> Result<AssessmentDetail, RecommendError> {
        self.ranker
            .catalog()
            .find_by_url(url.trim())
            .map(AssessmentDetail::from)
            .ok_or_else(|| RecommendError::NotFound(url.to_string()))
    }

    pub fn test_types(&self) -> Vec<TestTypeInfo> {
        self.ranker
            .catalog()
            .test_type_counts()
            .into_iter()
            .map(|c| TestTypeInfo {
                test_type: c.test_type,
                assessment_count: c.assessment_count,
            })
            .collect()
    }
}

/// Readiness-gated handle to the recommender, cheap to clone into request handlers.
#[derive(Clone, Default)]
pub struct SharedRecommender {
    slot: Arc<OnceLock<Arc<Recommender>>>,
}

impl SharedRecommender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(recommender: Recommender) -> Self {
        let shared = Self::new();
        // A fresh slot is always empty.
        let _ = shared.slot.set(Arc::new(recommender));
        shared
    }

    /// Install the initialized recommender. Only the first installation succeeds.
    pub fn install(&self, recommender: Recommender) -> Result<(), RecommendError> {
        self.slot.set(Arc::new(recommender)).map_err(|_| {
            RecommendError::Configuration("recommender is already installed".to_string())
        })
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn get(&self) -> Result<Arc<Recommender>, RecommendError> {
        self.slot.get().cloned().ok_or(RecommendError::NotReady)
    }

    pub fn health(&self) -> HealthResponse {
        match self.slot.get() {
            Some(recommender) => HealthResponse {
                status: "OK".to_string(),
                ready: true,
                embedding_model: Some(recommender.ranker.embedder().model_id().to_string()),
                assessment_count: Some(recommender.ranker.catalog().len()),
            },
            None => HealthResponse {
                status: "starting".to_string(),
                ready: false,
                embedding_model: None,
                assessment_count: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AssessmentRecord;
    use crate::embedding::HashEmbedder;

    fn recommender() -> Recommender {
        let records = vec![
            AssessmentRecord {
                name: "Core Java (Entry Level)".to_string(),
                url: "https://example.com/core-java-entry".to_string(),
                description: Some("Java fundamentals".to_string()),
                test_type: vec!["Knowledge & Skills".to_string()],
                duration: Some(13),
                remote_testing: true,
                adaptive_irt: true,
            },
            AssessmentRecord {
                name: "Sales Interview Simulation".to_string(),
                url: "https://example.com/sales-sim".to_string(),
                description: None,
                test_type: vec!["Simulations".to_string()],
                duration: None,
                remote_testing: false,
                adaptive_irt: false,
            },
        ];
        Recommender::new(
            Arc::new(Catalog::new(records).expect("valid catalog")),
            Arc::new(HashEmbedder::default()),
            RankerSettings::default(),
        )
        .expect("recommender builds")
    }

    #[tokio::test]
    async fn recommend_shapes_results() {
        let recommender = recommender();
        let results = recommender
            .recommend(&RecommendParams {
                query: "Java developer".to_string(),
                ..RecommendParams::default()
            })
            .await
            .expect("recommends");

        assert_eq!(results.len(), 2);
        let java = &results[0];
        assert_eq!(java.name, "Core Java (Entry Level)");
        assert_eq!(java.url, "https://example.com/core-java-entry");
        assert_eq!(java.test_type, vec!["Knowledge & Skills".to_string()]);
        assert_eq!(java.duration, Some(13));
        assert!(java.remote_testing && java.adaptive_irt);
        assert!(java.relevance > results[1].relevance);
    }

    #[tokio::test]
    async fn validation_happens_before_ranking() {
        let recommender = recommender();
        let err = recommender
            .recommend(&RecommendParams {
                query: String::new(),
                max_duration: Some(-10),
                ..RecommendParams::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendError::Validation(_)));
    }

    #[test]
    fn lookups() {
        let recommender = recommender();
        let detail = recommender
            .get_assessment(" https://example.com/sales-sim ")
            .expect("found");
        assert_eq!(detail.name, "Sales Interview Simulation");
        assert!(matches!(
            recommender.get_assessment("https://example.com/nope"),
            Err(RecommendError::NotFound(_))
        ));

        let types: Vec<String> = recommender
            .test_types()
            .into_iter()
            .map(|t| t.test_type)
            .collect();
        assert_eq!(types, vec!["Knowledge & Skills", "Simulations"]);
    }

    #[test]
    fn readiness_flips_once_installed() {
        let shared = SharedRecommender::new();
        assert!(!shared.is_ready());
        assert!(matches!(shared.get(), Err(RecommendError::NotReady)));
        let health = shared.health();
        assert!(!health.ready);
        assert_eq!(health.status, "starting");

        shared.install(recommender()).expect("first install");
        assert!(shared.is_ready());
        let health = shared.health();
        assert!(health.ready);
        assert_eq!(health.assessment_count, Some(2));
        assert_eq!(health.embedding_model.as_deref(), Some("feature-hash"));

        assert!(shared.install(recommender()).is_err());
        assert!(SharedRecommender::ready(recommender()).is_ready());
    }
}
