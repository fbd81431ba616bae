use serde::Deserialize;

use super::ExperimentGroup;

pub const DEFAULT_TOP_K: usize = 10;
pub const MAX_TOP_K: usize = 50;

/// Request body for `POST /recommend`
///
/// Every field is optional on the wire; [`RetrievalRequest::from`] resolves
/// it once into the tagged form the engine works with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub selected_movie_ids: Vec<i64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub query: Option<String>,
    /// Signed so that out-of-range values clamp instead of failing the request
    #[serde(default)]
    pub top_k: Option<i64>,
    #[serde(default)]
    pub variant: Option<ExperimentGroup>,
}

/// Cold-start signals, already normalized
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColdStartSignals {
    pub seeds: Vec<i64>,
    pub genres: Vec<String>,
    pub keywords: Vec<String>,
    pub query: Option<String>,
}

impl ColdStartSignals {
    pub fn new(
        seeds: Vec<i64>,
        genres: Vec<String>,
        keywords: Vec<String>,
        query: Option<String>,
    ) -> Self {
        Self {
            seeds: normalize_seeds(seeds),
            genres: genres.iter().filter_map(|g| normalize_genre(g)).collect(),
            keywords: keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            query: query
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
        }
    }

    pub fn has_vector_signal(&self) -> bool {
        !self.seeds.is_empty() || self.query.is_some()
    }

    pub fn has_criteria(&self) -> bool {
        !self.genres.is_empty() || !self.keywords.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_vector_signal() && !self.has_criteria()
    }
}

/// What the request is about, resolved once at the entry point
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalTarget {
    /// A subject with (possibly) a trained embedding; signals are only used
    /// if embeddings are not loaded, the subject has no vector or the
    /// primary lookup fails
    KnownUser {
        user_id: i64,
        signals: ColdStartSignals,
    },
    ColdStart(ColdStartSignals),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub target: RetrievalTarget,
    pub top_k: usize,
    pub variant_override: Option<ExperimentGroup>,
}

impl RetrievalRequest {
    pub fn known_user(user_id: i64, top_k: Option<i64>) -> Self {
        Self {
            target: RetrievalTarget::KnownUser {
                user_id,
                signals: ColdStartSignals::default(),
            },
            top_k: clamp_top_k(top_k),
            variant_override: None,
        }
    }

    pub fn cold_start(signals: ColdStartSignals, top_k: Option<i64>) -> Self {
        Self {
            target: RetrievalTarget::ColdStart(signals),
            top_k: clamp_top_k(top_k),
            variant_override: None,
        }
    }

    pub fn with_variant(mut self, variant: Option<ExperimentGroup>) -> Self {
        self.variant_override = variant;
        self
    }

    pub fn user_id(&self) -> Option<i64> {
        match &self.target {
            RetrievalTarget::KnownUser { user_id, .. } => Some(*user_id),
            RetrievalTarget::ColdStart(_) => None,
        }
    }

    pub fn signals(&self) -> &ColdStartSignals {
        match &self.target {
            RetrievalTarget::KnownUser { signals, .. } => signals,
            RetrievalTarget::ColdStart(signals) => signals,
        }
    }

    /// True when the request carries nothing the engine could act on
    pub fn has_no_signal(&self) -> bool {
        self.user_id().is_none() && self.signals().is_empty()
    }
}

impl From<RecommendRequest> for RetrievalRequest {
    fn from(request: RecommendRequest) -> Self {
        let signals = ColdStartSignals::new(
            request.selected_movie_ids,
            request.genres,
            request.keywords,
            request.query,
        );
        let target = match request.user_id {
            Some(user_id) => RetrievalTarget::KnownUser { user_id, signals },
            None => RetrievalTarget::ColdStart(signals),
        };

        Self {
            target,
            top_k: clamp_top_k(request.top_k),
            variant_override: request.variant,
        }
    }
}

pub fn clamp_top_k(top_k: Option<i64>) -> usize {
    match top_k {
        None => DEFAULT_TOP_K,
        Some(k) => k.clamp(1, MAX_TOP_K as i64) as usize,
    }
}

/// Title-cases a genre name, keeping the hyphenated MovieLens spellings
fn normalize_genre(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.to_lowercase().as_str() {
        "sci-fi" => return Some("Sci-Fi".to_string()),
        "film-noir" => return Some("Film-Noir".to_string()),
        _ => {}
    }

    let titled = trimmed
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ");

    Some(titled)
}

fn normalize_seeds(seeds: Vec<i64>) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    seeds
        .into_iter()
        .filter(|id| *id > 0 && seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genres_are_title_cased() {
        let signals = ColdStartSignals::new(
            vec![],
            vec![
                " action ".to_string(),
                "SCI-FI".to_string(),
                "film-noir".to_string(),
                "".to_string(),
            ],
            vec![],
            None,
        );
        assert_eq!(signals.genres, vec!["Action", "Sci-Fi", "Film-Noir"]);
    }

    #[test]
    fn test_keywords_trimmed_and_blank_dropped() {
        let signals = ColdStartSignals::new(
            vec![],
            vec![],
            vec!["  space ".to_string(), "   ".to_string()],
            Some("   ".to_string()),
        );
        assert_eq!(signals.keywords, vec!["space"]);
        assert_eq!(signals.query, None);
        assert!(signals.has_criteria());
        assert!(!signals.has_vector_signal());
    }

    #[test]
    fn test_seeds_drop_non_positive_and_duplicates() {
        let signals = ColdStartSignals::new(vec![5, -1, 0, 3, 5, 7], vec![], vec![], None);
        assert_eq!(signals.seeds, vec![5, 3, 7]);
    }

    #[test]
    fn test_top_k_defaults_and_clamps() {
        assert_eq!(clamp_top_k(None), 10);
        assert_eq!(clamp_top_k(Some(0)), 1);
        assert_eq!(clamp_top_k(Some(500)), 50);
        assert_eq!(clamp_top_k(Some(20)), 20);
        assert_eq!(clamp_top_k(Some(-4)), 1);
    }

    #[test]
    fn test_negative_top_k_in_body_is_clamped() {
        let body: RecommendRequest =
            serde_json::from_str(r#"{"genres": ["drama"], "top_k": -3}"#).unwrap();
        let request = RetrievalRequest::from(body);
        assert_eq!(request.top_k, 1);
    }

    #[test]
    fn test_request_with_user_resolves_to_known_user() {
        let request = RetrievalRequest::from(RecommendRequest {
            user_id: Some(12),
            selected_movie_ids: vec![1, 2],
            top_k: Some(5),
            variant: Some(ExperimentGroup::Treatment),
            ..Default::default()
        });

        assert_eq!(request.user_id(), Some(12));
        assert_eq!(request.signals().seeds, vec![1, 2]);
        assert_eq!(request.top_k, 5);
        assert_eq!(request.variant_override, Some(ExperimentGroup::Treatment));
    }

    #[test]
    fn test_anonymous_request_without_signals() {
        let request = RetrievalRequest::from(RecommendRequest::default());
        assert!(matches!(request.target, RetrievalTarget::ColdStart(_)));
        assert!(request.has_no_signal());
    }

    #[test]
    fn test_request_body_deserializes_with_missing_fields() {
        let request: RecommendRequest =
            serde_json::from_str(r#"{"genres": ["comedy"], "variant": "treatment"}"#).unwrap();
        assert_eq!(request.genres, vec!["comedy"]);
        assert_eq!(request.variant, Some(ExperimentGroup::Treatment));
        assert!(request.user_id.is_none());
    }
}
