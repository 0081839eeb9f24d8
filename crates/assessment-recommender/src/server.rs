use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};

use recommender_core::api::{
    AssessmentDetail, GetAssessmentParams, HealthResponse, RecommendParams, RecommendResponse,
    TestTypeListResponse,
};
use recommender_core::service::SharedRecommender;

#[derive(Clone)]
pub struct AssessmentRecommenderServer {
    recommender: SharedRecommender,
    tool_router: ToolRouter<AssessmentRecommenderServer>,
}

impl AssessmentRecommenderServer {
    pub fn new(recommender: SharedRecommender) -> Self {
        Self {
            recommender,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl AssessmentRecommenderServer {
    #[tool(description = "Recommend assessments for a job description or keywords. Optional filters: max_duration (minutes), remote_testing, adaptive_irt. Results are ordered by relevance.")]
    async fn recommend_assessments(
        &self,
        Parameters(params): Parameters<RecommendParams>,
    ) -> Result<Json<RecommendResponse>, String> {
        let recommender = self.recommender.get().map_err(|e| e.to_string())?;
        let recommendations = recommender
            .recommend(&params)
            .await
            .map_err(|e| format!("recommendation failed: {e}"))?;
        Ok(Json(RecommendResponse { recommendations }))
    }

    #[tool(description = "Get a single assessment from the catalog by its URL.")]
    async fn get_assessment(
        &self,
        Parameters(params): Parameters<GetAssessmentParams>,
    ) -> Result<Json<AssessmentDetail>, String> {
        let url = params.url.trim().to_string();
        if url.is_empty() {
            return Err("url must not be empty".to_string());
        }
        let recommender = self.recommender.get().map_err(|e| e.to_string())?;
        let detail = recommender.get_assessment(&url).map_err(|e| e.to_string())?;
        Ok(Json(detail))
    }

    #[tool(description = "List every assessment test type in the catalog with its assessment count.")]
    async fn list_test_types(&self) -> Result<Json<TestTypeListResponse>, String> {
        let recommender = self.recommender.get().map_err(|e| e.to_string())?;
        Ok(Json(TestTypeListResponse {
            test_types: recommender.test_types(),
        }))
    }

    #[tool(description = "Report whether the recommender has finished loading its catalog and embedding model.")]
    async fn health(&self) -> Result<Json<HealthResponse>, String> {
        Ok(Json(self.recommender.health()))
    }
}

#[tool_handler]
impl ServerHandler for AssessmentRecommenderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "assessment-recommender".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Assessment recommender MCP server. Use recommend_assessments with a job \
                 description or keywords (plus optional max_duration, remote_testing and \
                 adaptive_irt filters), get_assessment to look up one assessment by URL, \
                 list_test_types to browse categories, and health to check readiness."
                    .to_string(),
            ),
        }
    }
}
