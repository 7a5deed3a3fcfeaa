use crate::{
    error::{AppError, Result},
    models::user::UpdatePreferencesRequest,
    state::AppState,
    utils::middleware::OptionalAuth,
};
use axum::{
    extract::State,
    response::Json,
    routing::{get, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_preferences))
        .route("/", put(update_preferences))
}

async fn get_preferences(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    // 目录里重读，拿到最新的偏好
    let account = state
        .user_service
        .get(&user.id)
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(Json(json!({
        "success": true,
        "data": account.preferences
    })))
}

async fn update_preferences(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<UpdatePreferencesRequest>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let account = state.user_service.update_preferences(&user.id, request)?;

    Ok(Json(json!({
        "success": true,
        "data": account.preferences
    })))
}
