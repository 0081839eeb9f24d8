/// Post-ranking hard constraints.
///
/// Filtering only removes entries and never reorders them. Removed entries are not replaced by
/// candidates from deeper in the shortlist, so a filtered result may hold fewer than N records.
use crate::api::RecommendParams;
use crate::catalog::AssessmentRecord;
use crate::error::RecommendError;
use crate::ranker::ScoredCandidate;

/// Validated caller constraints. `false`/`None` means "no constraint", never "require false".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecommendationFilter {
    pub max_duration: Option<u32>,
    pub remote_testing: bool,
    pub adaptive_irt: bool,
}

impl RecommendationFilter {
    pub fn from_params(params: &RecommendParams) -> Result<Self, RecommendError> {
        let max_duration = match params.max_duration {
            Some(minutes) if minutes < 0 => {
                return Err(RecommendError::Validation(format!(
                    "max_duration must not be negative, got {minutes}"
                )))
            }
            // Durations are u32, so any larger ceiling admits the same records as u32::MAX.
            Some(minutes) => Some(u32::try_from(minutes).unwrap_or(u32::MAX)),
            None => None,
        };

        Ok(Self {
            max_duration,
            remote_testing: params.remote_testing.unwrap_or(false),
            adaptive_irt: params.adaptive_irt.unwrap_or(false),
        })
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    /// A record with unknown duration always passes the duration constraint.
    pub fn admits(&self, record: &AssessmentRecord) -> bool {
        if let (Some(limit), Some(duration)) = (self.max_duration, record.duration) {
            if duration > limit {
                return false;
            }
        }
        if self.remote_testing && !record.remote_testing {
            return false;
        }
        if self.adaptive_irt && !record.adaptive_irt {
            return false;
        }
        true
    }

    pub fn apply<'a>(&self, mut ranked: Vec<ScoredCandidate<'a>>) -> Vec<ScoredCandidate<'a>> {
        ranked.retain(|candidate| self.admits(candidate.record));
        ranked
    }
}
