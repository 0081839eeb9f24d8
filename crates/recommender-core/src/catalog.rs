/// Assessment catalog loading and validation.
///
/// The catalog is a JSON array of assessment records. It is parsed and validated once at
/// startup; afterwards it is shared read-only between requests.
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::RecommendError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_test_type")]
    pub test_type: Vec<String>,
    /// Minutes. `None` means unspecified, which is not the same as zero.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub remote_testing: bool,
    #[serde(default)]
    pub adaptive_irt: bool,
}

impl AssessmentRecord {
    /// Text indexed by the lexical pass: name, description and test-type tags, lower-cased.
    pub fn lexical_projection(&self) -> String {
        let mut parts: Vec<&str> = vec![self.name.as_str()];
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            parts.push(description);
        }
        parts.extend(self.test_type.iter().map(String::as_str));
        parts.join(" ").to_lowercase()
    }

    /// Text embedded by the semantic pass: name and test-type tags only.
    ///
    /// Descriptions are left out on purpose; they are long and noisy compared to titles.
    pub fn ranking_projection(&self) -> String {
        let mut parts: Vec<&str> = vec![self.name.as_str()];
        parts.extend(self.test_type.iter().map(String::as_str));
        parts.join(" ")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagList {
    One(String),
    Many(Vec<String>),
}

fn deserialize_test_type<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tags = Option::<TagList>::deserialize(deserializer)?;
    Ok(match tags {
        None => Vec::new(),
        Some(TagList::One(tag)) => vec![tag],
        Some(TagList::Many(tags)) => tags,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestTypeCount {
    pub test_type: String,
    pub assessment_count: usize,
}

/// Validated, immutable collection of assessment records in insertion order.
#[derive(Debug, Clone)]
pub struct Catalog {
    records: Vec<AssessmentRecord>,
    by_url: HashMap<String, usize>,
}

impl Catalog {
    /// Validate records and build the catalog.
    ///
    /// Fails when the catalog is empty, a record has a blank name, a URL is not an http(s)
    /// link, or two records share a URL.
    pub fn new(records: Vec<AssessmentRecord>) -> Result<Self, RecommendError> {
        if records.is_empty() {
            return Err(RecommendError::Configuration(
                "assessment catalog is empty".to_string(),
            ));
        }

        let url_re = Regex::new(r"^https?://[^\s/?#]+[^\s]*$").expect("valid regex");
        let mut by_url = HashMap::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            if record.name.trim().is_empty() {
                return Err(RecommendError::Configuration(format!(
                    "record {index}: name must not be empty"
                )));
            }
            if !url_re.is_match(&record.url) {
                return Err(RecommendError::Configuration(format!(
                    "record {index} ({}): invalid url '{}'",
                    record.name, record.url
                )));
            }
            if let Some(previous) = by_url.insert(record.url.clone(), index) {
                return Err(RecommendError::Configuration(format!(
                    "records {previous} and {index} share url '{}'",
                    record.url
                )));
            }
        }

        Ok(Self { records, by_url })
    }

    pub fn from_json(content: &str) -> Result<Self, RecommendError> {
        let records: Vec<AssessmentRecord> = serde_json::from_str(content).map_err(|e| {
            RecommendError::Configuration(format!("malformed assessment catalog: {e}"))
        })?;
        Self::new(records)
    }

    pub fn load(path: &Path) -> Result<Self, RecommendError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecommendError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let catalog = Self::from_json(&content)?;
        info!(path = %path.display(), records = catalog.len(), "assessment catalog loaded");
        Ok(catalog)
    }

    pub fn records(&self) -> &[AssessmentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_by_url(&self, url: &str) -> Option<&AssessmentRecord> {
        self.by_url.get(url).map(|&index| &self.records[index])
    }

    /// Every distinct test-type tag with the number of records carrying it, sorted by tag.
    pub fn test_type_counts(&self) -> Vec<TestTypeCount> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for record in &self.records {
            for tag in &record.test_type {
                *counts.entry(tag.as_str()).or_default() += 1;
            }
        }
        counts
            .into_iter()
            .map(|(test_type, assessment_count)| TestTypeCount {
                test_type: test_type.to_string(),
                assessment_count,
            })
            .collect()
    }
}
