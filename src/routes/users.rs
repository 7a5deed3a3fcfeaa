use crate::{
    error::{AppError, Result},
    models::user::{CreateUserRequest, UpdateStatusRequest, UserAccount},
    state::AppState,
    utils::middleware::OptionalAuth,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

/// 账号管理，全部仅限管理员
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_user))
        .route("/:id", get(get_user))
        .route("/:id/status", put(update_status))
}

fn require_admin(user: Option<UserAccount>) -> Result<UserAccount> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    if !user.is_admin() {
        return Err(AppError::forbidden("Administrator role required"));
    }
    Ok(user)
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    require_admin(user)?;
    request.validate()?;

    let account = state.user_service.create(request)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": account
        })),
    ))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    require_admin(user)?;

    let account = state
        .user_service
        .get(&user_id)
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(Json(json!({
        "success": true,
        "data": account
    })))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>> {
    require_admin(user)?;

    let account = state.user_service.set_status(&user_id, request.status)?;

    Ok(Json(json!({
        "success": true,
        "data": account
    })))
}
