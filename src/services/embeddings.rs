use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// On-disk layout of the trained embedding artifact
///
/// Row `i` of `embeddings` belongs to external user `user_ids[i]`.
#[derive(Debug, Deserialize)]
struct EmbeddingArtifact {
    user_ids: Vec<i64>,
    embeddings: Vec<Vec<f32>>,
}

/// One loaded embedding table; never mutated after construction
#[derive(Debug)]
struct EmbeddingTable {
    index_of: HashMap<i64, usize>,
    rows: Vec<Vec<f32>>,
    dimension: usize,
}

impl EmbeddingTable {
    fn from_artifact(artifact: EmbeddingArtifact) -> AppResult<Self> {
        if artifact.user_ids.len() != artifact.embeddings.len() {
            return Err(AppError::InvalidArtifact(format!(
                "{} user ids but {} embedding rows",
                artifact.user_ids.len(),
                artifact.embeddings.len()
            )));
        }

        let dimension = artifact.embeddings.first().map(Vec::len).unwrap_or(0);
        if artifact.embeddings.iter().any(|row| row.is_empty() || row.len() != dimension) {
            return Err(AppError::InvalidArtifact(
                "embedding rows must share one non-zero dimension".to_string(),
            ));
        }

        let mut index_of = HashMap::with_capacity(artifact.user_ids.len());
        for (row, user_id) in artifact.user_ids.iter().enumerate() {
            if index_of.insert(*user_id, row).is_some() {
                return Err(AppError::InvalidArtifact(format!(
                    "duplicate user id {}",
                    user_id
                )));
            }
        }

        Ok(Self {
            index_of,
            rows: artifact.embeddings,
            dimension,
        })
    }
}

/// Read-only table of trained user embeddings
///
/// Starts out not ready. A successful load swaps in a whole new table; a
/// failed load leaves whatever was being served untouched.
#[derive(Debug, Default)]
pub struct EmbeddingStore {
    table: RwLock<Option<Arc<EmbeddingTable>>>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the artifact at `path`, returning the number of users loaded
    pub async fn load(&self, path: impl AsRef<Path>) -> AppResult<usize> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AppError::InvalidArtifact(format!("cannot read {}: {}", path.display(), e))
        })?;

        self.load_from_slice(&bytes)
    }

    /// Parses and installs an artifact held in memory
    pub fn load_from_slice(&self, bytes: &[u8]) -> AppResult<usize> {
        let artifact: EmbeddingArtifact = serde_json::from_slice(bytes)
            .map_err(|e| AppError::InvalidArtifact(e.to_string()))?;
        let table = EmbeddingTable::from_artifact(artifact)?;
        let users = table.index_of.len();

        tracing::info!(users, dimension = table.dimension, "Loaded user embeddings");

        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(table));
        Ok(users)
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }

    /// The user's embedding, or `None` for unknown users and a store that is not ready
    pub fn vector_for(&self, user_id: i64) -> Option<Vec<f32>> {
        let table = self.snapshot()?;
        let row = *table.index_of.get(&user_id)?;
        table.rows.get(row).cloned()
    }

    pub fn known_user_ids(&self) -> HashSet<i64> {
        self.snapshot()
            .map(|table| table.index_of.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn known_user_count(&self) -> usize {
        self.snapshot().map(|table| table.index_of.len()).unwrap_or(0)
    }

    fn snapshot(&self) -> Option<Arc<EmbeddingTable>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"{
        "user_ids": [10, 20, 30],
        "embeddings": [[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]
    }"#;

    #[test]
    fn test_new_store_is_not_ready() {
        let store = EmbeddingStore::new();
        assert!(!store.is_ready());
        assert_eq!(store.vector_for(10), None);
        assert!(store.known_user_ids().is_empty());
    }

    #[test]
    fn test_load_maps_external_ids_to_rows() {
        let store = EmbeddingStore::new();
        assert_eq!(store.load_from_slice(ARTIFACT.as_bytes()).unwrap(), 3);

        assert!(store.is_ready());
        assert_eq!(store.vector_for(20), Some(vec![0.3, 0.4]));
        assert_eq!(store.vector_for(99), None);
        assert_eq!(store.known_user_ids(), HashSet::from([10, 20, 30]));
        assert_eq!(store.known_user_count(), 3);
    }

    #[test]
    fn test_parse_failure_leaves_store_not_ready() {
        let store = EmbeddingStore::new();
        let err = store.load_from_slice(b"{ not json").unwrap_err();

        assert!(matches!(err, AppError::InvalidArtifact(_)));
        assert!(!store.is_ready());
        assert_eq!(store.vector_for(10), None);
    }

    #[test]
    fn test_failed_reload_keeps_previous_table() {
        let store = EmbeddingStore::new();
        store.load_from_slice(ARTIFACT.as_bytes()).unwrap();

        let bad = r#"{"user_ids": [1, 2], "embeddings": [[1.0]]}"#;
        assert!(store.load_from_slice(bad.as_bytes()).is_err());

        assert_eq!(store.vector_for(10), Some(vec![0.1, 0.2]));
    }

    #[test]
    fn test_reload_replaces_table_wholesale() {
        let store = EmbeddingStore::new();
        store.load_from_slice(ARTIFACT.as_bytes()).unwrap();

        let next = r#"{"user_ids": [7], "embeddings": [[1.0, 0.0]]}"#;
        store.load_from_slice(next.as_bytes()).unwrap();

        assert_eq!(store.vector_for(10), None);
        assert_eq!(store.vector_for(7), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn test_rejects_inconsistent_dimensions() {
        let store = EmbeddingStore::new();
        let ragged = r#"{"user_ids": [1, 2], "embeddings": [[1.0, 2.0], [3.0]]}"#;
        assert!(store.load_from_slice(ragged.as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_duplicate_user_ids() {
        let store = EmbeddingStore::new();
        let dup = r#"{"user_ids": [1, 1], "embeddings": [[1.0], [2.0]]}"#;
        let err = store.load_from_slice(dup.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("duplicate user id 1"));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_an_artifact_error() {
        let store = EmbeddingStore::new();
        let err = store.load("/nonexistent/user_embeddings.json").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArtifact(_)));
        assert!(!store.is_ready());
    }
}
