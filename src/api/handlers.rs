use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{ExperimentGroup, RecommendRequest, RecommendationResponse, Recommendations, RetrievalRequest},
};

use super::AppState;

/// Header naming the experiment group that served the response
pub const AB_GROUP_HEADER: &str = "x-ab-group";

#[derive(Debug, Default, Deserialize)]
pub struct RecommendParams {
    pub top_k: Option<i64>,
    pub variant: Option<ExperimentGroup>,
}

fn recommendation_response(user_id: Option<i64>, result: Recommendations) -> Response {
    let group = result.group;
    let body = RecommendationResponse {
        user_id: user_id.unwrap_or(0),
        recommendations: result.items,
        ab_group: group,
        strategy: result.strategy,
        degraded: result.degraded,
    };

    (StatusCode::OK, [(AB_GROUP_HEADER, group.as_str())], Json(body)).into_response()
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let embeddings = state.embeddings();

    Json(json!({
        "status": "healthy",
        "embeddings_loaded": embeddings.is_ready(),
        "known_users": embeddings.known_user_count(),
        "cache_enabled": state.engine.cache_enabled(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Recommendations for a user by id
pub async fn recommend_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<RecommendParams>,
) -> AppResult<Response> {
    let request = RetrievalRequest::known_user(user_id, params.top_k).with_variant(params.variant);
    let result = state.engine.retrieve(request).await?;

    Ok(recommendation_response(Some(user_id), result))
}

/// Recommendations from a mixed request: user id and/or cold-start signals
pub async fn recommend(
    State(state): State<AppState>,
    Json(body): Json<RecommendRequest>,
) -> AppResult<Response> {
    let request = RetrievalRequest::from(body);
    if request.has_no_signal() {
        return Err(AppError::InvalidInput(
            "Provide a user_id or at least one of selected_movie_ids, genres, keywords, query"
                .to_string(),
        ));
    }

    let user_id = request.user_id();
    let result = state.engine.retrieve(request).await?;

    Ok(recommendation_response(user_id, result))
}

/// Drops a user's cached results in every experiment group
pub async fn invalidate_cache(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Json<Value> {
    let invalidated = state.engine.invalidate_user(user_id).await;
    Json(json!({ "user_id": user_id, "invalidated": invalidated }))
}

/// Reloads the user-embedding artifact; the previous table stays in service on failure
pub async fn reload_embeddings(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let path = state.embeddings_path.as_path();
    let known_users = state.embeddings().load(path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Embedding reload failed");
        e
    })?;

    Ok(Json(json!({ "status": "reloaded", "known_users": known_users })))
}
