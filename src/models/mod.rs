use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;

pub mod movie;
pub mod request;

pub use movie::{parse_genres, Candidate, MovieMetadata, RankedMovie};
pub use request::{
    ColdStartSignals, RecommendRequest, RetrievalRequest, RetrievalTarget, DEFAULT_TOP_K,
};

/// Experiment variant a subject is bucketed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentGroup {
    /// Plain nearest-neighbor ranking
    Control,
    /// Discovery mode: wider candidate pool, randomly sampled
    Treatment,
}

impl ExperimentGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentGroup::Control => "control",
            ExperimentGroup::Treatment => "treatment",
        }
    }
}

impl Display for ExperimentGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy that produced a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    KnownUser,
    ColdStartByVector,
    ColdStartByCriteria,
    Empty,
}

/// Result of a single retrieval call
#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub items: Vec<RankedMovie>,
    pub strategy: Strategy,
    pub group: ExperimentGroup,
    /// Set when a dependency failed and a fallback path produced the items
    pub degraded: bool,
    pub from_cache: bool,
}

/// Known-user result set as stored in the cache
///
/// `items` may be shorter than `computed_for` when some candidates had no
/// metadata; such an entry is still complete for requests up to that size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecommendations {
    pub computed_for: usize,
    pub items: Vec<RankedMovie>,
}

impl CachedRecommendations {
    /// Items for a request of `top_k` with `excluded` ids hidden, or `None`
    /// when the entry cannot answer that request on its own
    pub fn serve(self, top_k: usize, excluded: &HashSet<i64>) -> Option<Vec<RankedMovie>> {
        let complete = self.computed_for >= top_k + excluded.len();
        let items: Vec<RankedMovie> = self
            .items
            .into_iter()
            .filter(|movie| !excluded.contains(&movie.id))
            .take(top_k)
            .collect();

        (complete || items.len() == top_k).then_some(items)
    }
}

/// Response for the recommendation endpoints
#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    /// `0` for anonymous cold-start requests
    pub user_id: i64,
    pub recommendations: Vec<RankedMovie>,
    pub ab_group: ExperimentGroup,
    pub strategy: Strategy,
    pub degraded: bool,
}
