use std::path::PathBuf;
use std::sync::Arc;

use crate::services::{EmbeddingStore, RetrievalEngine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RetrievalEngine>,
    /// Where `POST /admin/embeddings/reload` reads the artifact from
    pub embeddings_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(engine: Arc<RetrievalEngine>, embeddings_path: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            embeddings_path: Arc::new(embeddings_path.into()),
        }
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingStore> {
        self.engine.embeddings()
    }
}
