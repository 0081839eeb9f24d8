/// Request and response types shared by every serving surface.
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::AssessmentRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecommendParams {
    /// Job description or keywords to match assessments against.
    pub query: String,
    /// Drop assessments known to take longer than this many minutes.
    #[serde(default)]
    pub max_duration: Option<i64>,
    /// When true, only assessments that support remote testing are returned.
    #[serde(default)]
    pub remote_testing: Option<bool>,
    /// When true, only adaptive/IRT assessments are returned.
    #[serde(default)]
    pub adaptive_irt: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recommendation {
    pub name: String,
    pub url: String,
    pub test_type: Vec<String>,
    pub duration: Option<u32>,
    pub remote_testing: bool,
    pub adaptive_irt: bool,
    /// Cosine similarity between the query and the assessment, used for ordering.
    pub relevance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecommendResponse {
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetAssessmentParams {
    /// Canonical catalog URL of the assessment.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssessmentDetail {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub test_type: Vec<String>,
    pub duration: Option<u32>,
    pub remote_testing: bool,
    pub adaptive_irt: bool,
}

impl From<&AssessmentRecord> for AssessmentDetail {
    fn from(record: &AssessmentRecord) -> Self {
        Self {
            name: record.name.clone(),
            url: record.url.clone(),
            description: record.description.clone(),
            test_type: record.test_type.clone(),
            duration: record.duration,
            remote_testing: record.remote_testing,
            adaptive_irt: record.adaptive_irt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TestTypeInfo {
    pub test_type: String,
    pub assessment_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TestTypeListResponse {
    pub test_types: Vec<TestTypeInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    pub ready: bool,
    /// Populated once the recommender is ready.
    pub embedding_model: Option<String>,
    pub assessment_count: Option<usize>,
}
