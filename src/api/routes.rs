use axum::{
    http::{HeaderName, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::middleware::{make_span_with_request_id, request_id_middleware, REQUEST_ID_HEADER};

use super::handlers::{self, AB_GROUP_HEADER};
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Recommendations
        .route("/recommend", post(handlers::recommend))
        .route("/recommend/:user_id", get(handlers::recommend_for_user))
        .route("/recommend/:user_id/cache", delete(handlers::invalidate_cache))
        // Admin
        .route("/admin/embeddings/reload", post(handlers::reload_embeddings))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // The request id must be set before the trace span is made
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
}

/// CORS policy for the configured browser origins
///
/// Origins that fail to parse as header values are skipped with a warning.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static(AB_GROUP_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}
