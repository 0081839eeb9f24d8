use recommender_core::error::RecommendError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Recommend(#[from] RecommendError),
}
