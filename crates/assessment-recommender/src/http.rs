/// HTTP surface: `GET /health`, `POST /recommend`, `GET /assessments?url=`, `GET /test-types`.
///
/// The router is mounted before the recommender finishes loading; until then `/health`
/// reports `ready: false` and every other route answers 503.
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use recommender_core::api::{
    AssessmentDetail, GetAssessmentParams, HealthResponse, RecommendParams, RecommendResponse,
    TestTypeListResponse,
};
use recommender_core::error::RecommendError;
use recommender_core::service::SharedRecommender;

pub fn router(recommender: SharedRecommender) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/recommend", post(recommend))
        .route("/assessments", get(get_assessment))
        .route("/test-types", get(list_test_types))
        .with_state(recommender)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError(RecommendError);

impl From<RecommendError> for ApiError {
    fn from(err: RecommendError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RecommendError::EmptyQuery | RecommendError::Validation(_) => StatusCode::BAD_REQUEST,
            RecommendError::NotFound(_) => StatusCode::NOT_FOUND,
            RecommendError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            RecommendError::Embedding(_) | RecommendError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

async fn health(State(recommender): State<SharedRecommender>) -> Json<HealthResponse> {
    Json(recommender.health())
}

async fn recommend(
    State(recommender): State<SharedRecommender>,
    Json(params): Json<RecommendParams>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let recommendations = recommender.get()?.recommend(&params).await?;
    Ok(Json(RecommendResponse { recommendations }))
}

async fn get_assessment(
    State(recommender): State<SharedRecommender>,
    Query(params): Query<GetAssessmentParams>,
) -> Result<Json<AssessmentDetail>, ApiError> {
    Ok(Json(recommender.get()?.get_assessment(&params.url)?))
}

async fn list_test_types(
    State(recommender): State<SharedRecommender>,
) -> Result<Json<TestTypeListResponse>, ApiError> {
    Ok(Json(TestTypeListResponse {
        test_types: recommender.get()?.test_types(),
    }))
}
