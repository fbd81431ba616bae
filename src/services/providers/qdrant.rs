//! Qdrant adapters
//!
//! Item vectors live in one collection (the collaborative-filtering space the
//! offline indexer writes), content vectors in another. Points carry the movie
//! id in a `movie_id` payload field; the numeric point id is used when the
//! payload is missing.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, vectors_output::VectorsOptions, GetPointsBuilder,
    PointId, Query, QueryPointsBuilder, RetrievedPoint, ScoredPoint, Value,
};
use qdrant_client::Qdrant;

use crate::{
    error::{AppError, AppResult, Dependency},
    models::Candidate,
    services::providers::{ContentSearch, TextEncoder, VectorIndex},
};

const MOVIE_ID_FIELD: &str = "movie_id";

/// Builds a Qdrant client whose every request is bounded by `timeout`
pub fn create_qdrant_client(url: &str, timeout: Duration) -> anyhow::Result<Qdrant> {
    let client = Qdrant::from_url(url).timeout(timeout).build()?;
    Ok(client)
}

/// [`VectorIndex`] over a Qdrant collection
#[derive(Clone)]
pub struct QdrantVectorIndex {
    client: Arc<Qdrant>,
    collection: String,
}

impl QdrantVectorIndex {
    pub fn new(client: Arc<Qdrant>, collection: String) -> Self {
        Self { client, collection }
    }
}

#[async_trait::async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn query_nearest(&self, vector: &[f32], k: usize) -> AppResult<Vec<Candidate>> {
        let points = nearest_points(&self.client, &self.collection, vector.to_vec(), k)
            .await
            .map_err(|e| AppError::unavailable(Dependency::VectorIndex, e))?;

        Ok(points.iter().filter_map(scored_candidate).collect())
    }

    async fn retrieve_vectors(&self, ids: &[i64]) -> AppResult<HashMap<i64, Vec<f32>>> {
        let point_ids: Vec<PointId> = ids
            .iter()
            .filter_map(|id| u64::try_from(*id).ok())
            .map(PointId::from)
            .collect();
        if point_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(self.collection.clone(), point_ids)
                    .with_vectors(true)
                    .with_payload(true),
            )
            .await
            .map_err(|e| AppError::unavailable(Dependency::VectorIndex, e))?;

        let vectors: HashMap<i64, Vec<f32>> = response
            .result
            .iter()
            .filter_map(|point| {
                let movie_id = movie_id(&point.payload, point.id.as_ref())?;
                let vector = dense_vector(point)?;
                Some((movie_id, vector))
            })
            .collect();

        tracing::debug!(
            collection = %self.collection,
            requested = ids.len(),
            found = vectors.len(),
            "Retrieved item vectors"
        );

        Ok(vectors)
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}

/// [`ContentSearch`] that encodes the query and searches the content collection
pub struct QdrantContentSearch {
    client: Arc<Qdrant>,
    collection: String,
    encoder: Arc<dyn TextEncoder>,
}

impl QdrantContentSearch {
    pub fn new(client: Arc<Qdrant>, collection: String, encoder: Arc<dyn TextEncoder>) -> Self {
        Self {
            client,
            collection,
            encoder,
        }
    }
}

#[async_trait::async_trait]
impl ContentSearch for QdrantContentSearch {
    async fn search_text(&self, query: &str, limit: usize) -> AppResult<Vec<i64>> {
        let vector = self.encoder.encode(query).await?;
        let points = nearest_points(&self.client, &self.collection, vector, limit)
            .await
            .map_err(|e| AppError::unavailable(Dependency::ContentSearch, e))?;

        Ok(points
            .iter()
            .filter_map(|point| movie_id(&point.payload, point.id.as_ref()))
            .collect())
    }
}

async fn nearest_points(
    client: &Qdrant,
    collection: &str,
    vector: Vec<f32>,
    limit: usize,
) -> Result<Vec<ScoredPoint>, qdrant_client::QdrantError> {
    let search = QueryPointsBuilder::new(collection.to_string())
        .query(Query::new_nearest(vector))
        .with_payload(true)
        .limit(limit as u64);

    let response = client.query(search).await?;
    Ok(response.result)
}

fn scored_candidate(point: &ScoredPoint) -> Option<Candidate> {
    let movie_id = movie_id(&point.payload, point.id.as_ref())?;
    Some(Candidate::new(movie_id, point.score))
}

fn movie_id(payload: &HashMap<String, Value>, point_id: Option<&PointId>) -> Option<i64> {
    let from_payload = payload
        .get(MOVIE_ID_FIELD)
        .and_then(|value| match &value.kind {
            Some(Kind::IntegerValue(id)) => Some(*id),
            Some(Kind::DoubleValue(id)) if id.fract() == 0.0 => Some(*id as i64),
            Some(Kind::StringValue(id)) => id.parse().ok(),
            _ => None,
        });

    from_payload.or_else(|| match point_id?.point_id_options.as_ref()? {
        PointIdOptions::Num(id) => i64::try_from(*id).ok(),
        PointIdOptions::Uuid(_) => None,
    })
}

#[allow(deprecated)]
fn dense_vector(point: &RetrievedPoint) -> Option<Vec<f32>> {
    match point.vectors.as_ref()?.vectors_options.as_ref()? {
        VectorsOptions::Vector(vector) if !vector.data.is_empty() => Some(vector.data.clone()),
        _ => None,
    }
}
