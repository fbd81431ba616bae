//! External collaborators of the retrieval engine
//!
//! Each collaborator sits behind an async trait so the engine can be wired to
//! the production adapters (Qdrant, PostgreSQL, an HTTP embeddings endpoint)
//! or to in-memory doubles in tests.
use std::collections::HashMap;

use crate::{
    error::AppResult,
    models::{Candidate, MovieMetadata},
};

pub mod encoder;
pub mod qdrant;

/// Approximate nearest-neighbor search over item vectors
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` candidates in descending score order
    ///
    /// Ties keep the index's native order.
    async fn query_nearest(&self, vector: &[f32], k: usize) -> AppResult<Vec<Candidate>>;

    /// Vectors for the given movie ids; ids the index does not hold are omitted
    async fn retrieve_vectors(&self, ids: &[i64]) -> AppResult<HashMap<i64, Vec<f32>>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Free-text search over the content collection
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContentSearch: Send + Sync {
    /// Movie ids whose content vectors are nearest to the encoded query
    async fn search_text(&self, query: &str, limit: usize) -> AppResult<Vec<i64>>;
}

/// Turns natural-language text into a vector
#[async_trait::async_trait]
pub trait TextEncoder: Send + Sync {
    async fn encode(&self, text: &str) -> AppResult<Vec<f32>>;
}

/// Movie metadata lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Metadata for the given ids; unknown ids are absent from the map
    async fn get_by_ids(&self, ids: &[i64]) -> AppResult<HashMap<i64, MovieMetadata>>;

    /// Ids whose genres contain any of `genres` or whose title contains any of
    /// `keywords` (case-insensitive), in store order, at most `limit`
    async fn find_by_criteria(
        &self,
        genres: &[String],
        keywords: &[String],
        limit: usize,
    ) -> AppResult<Vec<i64>>;
}
