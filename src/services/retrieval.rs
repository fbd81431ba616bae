use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    db::{CacheKey, ResultCache},
    error::{bounded, AppError, AppResult, Dependency},
    models::{
        CachedRecommendations, Candidate, ColdStartSignals, ExperimentGroup, MovieMetadata,
        RankedMovie, Recommendations, RetrievalRequest, RetrievalTarget, Strategy,
    },
    services::{
        embeddings::EmbeddingStore,
        experiment::ExperimentAssigner,
        providers::{ContentSearch, MetadataStore, VectorIndex},
        ranking::{centroid, dedup_candidates, enrich, rank_by_genre},
    },
};

/// Tunables for [`RetrievalEngine`]
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub cache_ttl: Duration,
    /// Bound applied to every index, metadata and content-search call
    pub dependency_timeout: Duration,
    /// Content-search hits promoted to cold-start seeds
    pub content_seed_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            dependency_timeout: Duration::from_secs(2),
            content_seed_limit: 5,
        }
    }
}

/// Hybrid retrieval orchestrator
///
/// Picks a strategy per request, in order:
///
/// 1. known user: nearest items to the user's trained embedding, cached
///    per (user, experiment group)
/// 2. cold start by vector: centroid of the seed items' vectors, optionally
///    re-ranked by genre overlap
/// 3. cold start by criteria: metadata filter on genres and title keywords
/// 4. empty
///
/// A strategy that finds nothing hands over to the next one. A dependency
/// failure does the same when a later strategy has signals to work with, and
/// the result is flagged as degraded.
pub struct RetrievalEngine {
    embeddings: Arc<EmbeddingStore>,
    index: Arc<dyn VectorIndex>,
    metadata: Arc<dyn MetadataStore>,
    content: Option<Arc<dyn ContentSearch>>,
    cache: ResultCache,
    assigner: ExperimentAssigner,
    rng: Mutex<StdRng>,
    settings: EngineSettings,
}

impl RetrievalEngine {
    pub fn new(
        embeddings: Arc<EmbeddingStore>,
        index: Arc<dyn VectorIndex>,
        metadata: Arc<dyn MetadataStore>,
        cache: ResultCache,
        assigner: ExperimentAssigner,
        settings: EngineSettings,
    ) -> Self {
        Self {
            embeddings,
            index,
            metadata,
            content: None,
            cache,
            assigner,
            rng: Mutex::new(StdRng::from_entropy()),
            settings,
        }
    }

    pub fn with_content_search(mut self, content: Arc<dyn ContentSearch>) -> Self {
        self.content = Some(content);
        self
    }

    /// Replaces the treatment sampler, e.g. with a seeded one
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingStore> {
        &self.embeddings
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    pub fn group_for(&self, request: &RetrievalRequest) -> ExperimentGroup {
        match (request.variant_override, request.user_id()) {
            (Some(group), _) => group,
            (None, Some(user_id)) => self.assigner.assign_user(user_id),
            (None, None) => self.assigner.assign(None),
        }
    }

    /// Runs one retrieval request through the strategy chain
    ///
    /// The result holds at most `request.top_k` items with no repeated ids.
    pub async fn retrieve(&self, request: RetrievalRequest) -> AppResult<Recommendations> {
        let group = self.group_for(&request);
        let top_k = request.top_k;

        let result = match &request.target {
            RetrievalTarget::KnownUser { user_id, signals } => {
                self.retrieve_for_user(*user_id, signals, top_k, group).await?
            }
            RetrievalTarget::ColdStart(signals) => {
                self.cold_start(signals, top_k, group, false).await?
            }
        };

        tracing::info!(
            user_id = ?request.user_id(),
            strategy = ?result.strategy,
            ab_group = %group,
            count = result.items.len(),
            degraded = result.degraded,
            from_cache = result.from_cache,
            "Retrieval complete"
        );

        Ok(result)
    }

    /// Drops cached results for the user in every experiment group
    pub async fn invalidate_user(&self, user_id: i64) -> bool {
        let mut removed = false;
        for key in CacheKey::all_for_user(user_id) {
            removed |= self.cache.invalidate(&key).await;
        }
        removed
    }

    async fn retrieve_for_user(
        &self,
        user_id: i64,
        signals: &ColdStartSignals,
        top_k: usize,
        group: ExperimentGroup,
    ) -> AppResult<Recommendations> {
        let key = CacheKey::known_user(user_id, group);
        let excluded: HashSet<i64> = signals.seeds.iter().copied().collect();

        if let Some(cached) = self.cache.get::<CachedRecommendations>(&key).await {
            if let Some(items) = cached.serve(top_k, &excluded) {
                return Ok(Recommendations {
                    items,
                    strategy: Strategy::KnownUser,
                    group,
                    degraded: false,
                    from_cache: true,
                });
            }
        }

        if !self.embeddings.is_ready() {
            if signals.is_empty() {
                return Err(AppError::NotReady);
            }
            tracing::warn!(user_id = %user_id, "User embeddings not loaded, serving cold start");
            return self.cold_start(signals, top_k, group, true).await;
        }

        let Some(vector) = self.embeddings.vector_for(user_id) else {
            tracing::debug!(user_id = %user_id, "No embedding for user, falling back to cold start");
            return self.cold_start(signals, top_k, group, false).await;
        };

        match self.known_user_items(&vector, &excluded, top_k, group).await {
            Ok(items) if !items.is_empty() => {
                // Seeded results are missing ids a plain request would get
                if excluded.is_empty() {
                    let entry = CachedRecommendations {
                        computed_for: top_k,
                        items: items.clone(),
                    };
                    self.cache.set(&key, &entry, self.settings.cache_ttl).await;
                }
                Ok(Recommendations {
                    items,
                    strategy: Strategy::KnownUser,
                    group,
                    degraded: false,
                    from_cache: false,
                })
            }
            Ok(_) => {
                tracing::debug!(user_id = %user_id, "Index returned nothing for user, falling back to cold start");
                self.cold_start(signals, top_k, group, false).await
            }
            Err(e) if e.is_dependency_failure() && !signals.is_empty() => {
                tracing::warn!(
                    user_id = %user_id,
                    provider = self.index.name(),
                    error = %e,
                    "Known-user retrieval failed, falling back to cold start"
                );
                self.cold_start(signals, top_k, group, true).await
            }
            Err(e) => Err(e),
        }
    }

    async fn known_user_items(
        &self,
        vector: &[f32],
        excluded: &HashSet<i64>,
        top_k: usize,
        group: ExperimentGroup,
    ) -> AppResult<Vec<RankedMovie>> {
        let pool = match group {
            ExperimentGroup::Control => top_k,
            ExperimentGroup::Treatment => top_k * 2,
        } + excluded.len();

        let candidates = self.query_nearest(vector, pool).await?;
        let candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| !excluded.contains(&c.movie_id))
            .collect();

        let candidates = match group {
            ExperimentGroup::Control => candidates.into_iter().take(top_k).collect(),
            ExperimentGroup::Treatment => self.sample(candidates, top_k),
        };

        let metadata = self.fetch_metadata(&candidates).await?;
        Ok(enrich(&candidates, &metadata))
    }

    async fn cold_start(
        &self,
        signals: &ColdStartSignals,
        top_k: usize,
        group: ExperimentGroup,
        mut degraded: bool,
    ) -> AppResult<Recommendations> {
        if signals.has_vector_signal() {
            let (seed_ids, content_degraded) = self.resolve_seed_ids(signals).await;
            degraded |= content_degraded;

            match self.cold_start_by_vector(&seed_ids, signals, top_k).await {
                Ok(items) if !items.is_empty() => {
                    return Ok(Recommendations {
                        items,
                        strategy: Strategy::ColdStartByVector,
                        group,
                        degraded,
                        from_cache: false,
                    });
                }
                Ok(_) => {
                    tracing::debug!(seeds = seed_ids.len(), "Seed vectors produced no candidates");
                }
                Err(e) if e.is_dependency_failure() && signals.has_criteria() => {
                    tracing::warn!(error = %e, "Vector cold start failed, falling back to criteria");
                    degraded = true;
                }
                Err(e) => return Err(e),
            }
        }

        if signals.has_criteria() {
            let items = self.cold_start_by_criteria(signals, top_k).await?;
            return Ok(Recommendations {
                items,
                strategy: Strategy::ColdStartByCriteria,
                group,
                degraded,
                from_cache: false,
            });
        }

        Ok(Recommendations {
            items: Vec::new(),
            strategy: Strategy::Empty,
            group,
            degraded,
            from_cache: false,
        })
    }

    /// Explicit seeds followed by content-search hits for the free-text query
    ///
    /// The flag is set when content search was attempted and failed.
    async fn resolve_seed_ids(&self, signals: &ColdStartSignals) -> (Vec<i64>, bool) {
        let mut seeds = signals.seeds.clone();

        let (Some(query), Some(content)) = (&signals.query, &self.content) else {
            return (seeds, false);
        };

        let search = content.search_text(query, self.settings.content_seed_limit);
        match bounded(Dependency::ContentSearch, self.settings.dependency_timeout, search).await {
            Ok(ids) => {
                tracing::debug!(query = %query, hits = ids.len(), "Content search");
                for id in ids {
                    if !seeds.contains(&id) {
                        seeds.push(id);
                    }
                }
                (seeds, false)
            }
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Content search failed, ignoring query");
                (seeds, true)
            }
        }
    }

    async fn cold_start_by_vector(
        &self,
        seed_ids: &[i64],
        signals: &ColdStartSignals,
        top_k: usize,
    ) -> AppResult<Vec<RankedMovie>> {
        if seed_ids.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = bounded(
            Dependency::VectorIndex,
            self.settings.dependency_timeout,
            self.index.retrieve_vectors(seed_ids),
        )
        .await?;

        let rows: Vec<Vec<f32>> = seed_ids
            .iter()
            .filter_map(|id| vectors.get(id).cloned())
            .collect();
        let Some(center) = centroid(&rows) else {
            return Ok(Vec::new());
        };

        // Every seed is hidden, including those promoted from content search
        let excluded: HashSet<i64> = seed_ids.iter().copied().collect();
        let candidates: Vec<Candidate> = self
            .query_nearest(&center, top_k * 2 + excluded.len())
            .await?
            .into_iter()
            .filter(|c| !excluded.contains(&c.movie_id))
            .collect();

        let metadata = self.fetch_metadata(&candidates).await?;
        let candidates = if signals.genres.is_empty() {
            candidates
        } else {
            rank_by_genre(candidates, &metadata, &signals.genres)
        };

        let candidates: Vec<Candidate> = candidates.into_iter().take(top_k).collect();
        Ok(enrich(&candidates, &metadata))
    }

    async fn cold_start_by_criteria(
        &self,
        signals: &ColdStartSignals,
        top_k: usize,
    ) -> AppResult<Vec<RankedMovie>> {
        let ids = bounded(
            Dependency::MetadataStore,
            self.settings.dependency_timeout,
            self.metadata
                .find_by_criteria(&signals.genres, &signals.keywords, top_k),
        )
        .await?;

        let candidates: Vec<Candidate> =
            dedup_candidates(ids.into_iter().map(Candidate::unscored).collect())
                .into_iter()
                .take(top_k)
                .collect();

        let metadata = self.fetch_metadata(&candidates).await?;
        Ok(enrich(&candidates, &metadata))
    }

    async fn query_nearest(&self, vector: &[f32], k: usize) -> AppResult<Vec<Candidate>> {
        let candidates = bounded(
            Dependency::VectorIndex,
            self.settings.dependency_timeout,
            self.index.query_nearest(vector, k),
        )
        .await?;

        Ok(dedup_candidates(candidates))
    }

    async fn fetch_metadata(
        &self,
        candidates: &[Candidate],
    ) -> AppResult<HashMap<i64, MovieMetadata>> {
        if candidates.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<i64> = candidates.iter().map(|c| c.movie_id).collect();
        bounded(
            Dependency::MetadataStore,
            self.settings.dependency_timeout,
            self.metadata.get_by_ids(&ids),
        )
        .await
    }

    /// Uniform sample of `top_k` candidates, keeping their relative order
    fn sample(&self, candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
        if candidates.len() <= top_k {
            return candidates;
        }

        let mut picked = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rand::seq::index::sample(&mut *rng, candidates.len(), top_k).into_vec()
        };
        picked.sort_unstable();

        picked.into_iter().map(|i| candidates[i]).collect()
    }
}
