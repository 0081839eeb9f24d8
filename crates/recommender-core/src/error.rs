/// Error types for the recommendation pipeline.
///
/// `Configuration` failures are raised while building the service and must abort startup.
/// Every other variant is scoped to a single request; ranking is all-or-nothing, so a request
/// that fails returns no partial result.

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("query is empty after normalization")]
    EmptyQuery,

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("recommender is not ready yet")]
    NotReady,

    #[error("assessment not found: {0}")]
    NotFound(String),
}
