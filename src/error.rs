use std::fmt::Display;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// External collaborators the engine talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    VectorIndex,
    ContentSearch,
    MetadataStore,
    TextEncoder,
}

impl Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dependency::VectorIndex => "vector index",
            Dependency::ContentSearch => "content search",
            Dependency::MetadataStore => "metadata store",
            Dependency::TextEncoder => "text encoder",
        };
        f.write_str(name)
    }
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Embeddings are not loaded")]
    NotReady,

    #[error("{dependency} unavailable: {message}")]
    DependencyUnavailable {
        dependency: Dependency,
        message: String,
    },

    #[error("{dependency} timed out")]
    Timeout { dependency: Dependency },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid embedding artifact: {0}")]
    InvalidArtifact(String),
}

impl AppError {
    pub fn unavailable(dependency: Dependency, cause: impl Display) -> Self {
        AppError::DependencyUnavailable {
            dependency,
            message: cause.to_string(),
        }
    }

    /// True for failures of an external collaborator, which the engine may
    /// route around with a fallback strategy.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            AppError::DependencyUnavailable { .. }
                | AppError::Timeout { .. }
                | AppError::Database(_)
                | AppError::HttpClient(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidArtifact(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            AppError::DependencyUnavailable { .. } | AppError::HttpClient(_) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Bounds a call to an external collaborator with a timeout
///
/// An elapsed timer is reported as that dependency's failure, so callers can
/// fall back exactly as they would for a connection error.
pub async fn bounded<T, F>(
    dependency: Dependency,
    limit: std::time::Duration,
    fut: F,
) -> AppResult<T>
where
    F: std::future::Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(dependency = %dependency, timeout_ms = limit.as_millis() as u64, "Dependency call timed out");
            Err(AppError::Timeout { dependency })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_dependency_failures_are_classified() {
        assert!(AppError::unavailable(Dependency::VectorIndex, "refused").is_dependency_failure());
        assert!(AppError::Timeout {
            dependency: Dependency::MetadataStore
        }
        .is_dependency_failure());
        assert!(!AppError::NotReady.is_dependency_failure());
        assert!(!AppError::InvalidInput("x".to_string()).is_dependency_failure());
    }

    #[test]
    fn test_unavailable_message_names_dependency() {
        let err = AppError::unavailable(Dependency::VectorIndex, "connection refused");
        assert_eq!(err.to_string(), "vector index unavailable: connection refused");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotReady.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::InvalidInput("bad".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Timeout {
                dependency: Dependency::VectorIndex
            }
            .into_response()
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::InvalidArtifact("ragged rows".to_string())
                .into_response()
                .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Database(sqlx::Error::PoolTimedOut)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_bounded_passes_through_result() {
        let value = bounded(Dependency::VectorIndex, Duration::from_secs(1), async {
            Ok::<_, AppError>(7)
        })
        .await;
        tokio_test::assert_ok!(&value);
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_bounded_reports_timeout_as_dependency_failure() {
        let result: AppResult<()> = bounded(
            Dependency::MetadataStore,
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        match result {
            Err(AppError::Timeout { dependency }) => {
                assert_eq!(dependency, Dependency::MetadataStore)
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
