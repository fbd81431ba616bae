pub mod embeddings;
pub mod experiment;
pub mod providers;
pub mod ranking;
pub mod retrieval;

pub use embeddings::EmbeddingStore;
pub use experiment::ExperimentAssigner;
pub use retrieval::{EngineSettings, RetrievalEngine};
