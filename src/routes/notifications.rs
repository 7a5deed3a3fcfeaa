use crate::{
    error::{AppError, Result},
    models::notification::*,
    state::AppState,
    utils::middleware::OptionalAuth,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_notification))
        .route("/", get(list_notifications))
        .route("/search", get(search_notifications))
        .route("/:id", get(get_notification))
        .route("/:id", put(update_notification))
        .route("/:id", delete(delete_notification))
        .route("/:id/recipients", get(list_recipients))
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let result = state.notification_service.create(&user, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": result
        })),
    ))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let page = state.notification_service.list_for_caller(&user, &query)?;

    Ok(Json(json!({
        "success": true,
        "data": page
    })))
}

async fn search_notifications(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let page = state.notification_service.search(&user, &query)?;

    Ok(Json(json!({
        "success": true,
        "data": page
    })))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(notification_id): Path<String>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let detail = state.notification_service.get(&user, &notification_id)?;

    Ok(Json(json!({
        "success": true,
        "data": detail
    })))
}

async fn update_notification(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(notification_id): Path<String>,
    Json(request): Json<UpdateNotificationRequest>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let detail = state
        .notification_service
        .update(&user, &notification_id, request)?;

    Ok(Json(json!({
        "success": true,
        "data": detail
    })))
}

async fn delete_notification(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(notification_id): Path<String>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let removed = state
        .notification_service
        .delete(&user, &notification_id)?;

    Ok(Json(json!({
        "success": true,
        "message": "Notification deleted successfully",
        "data": { "removed_deliveries": removed }
    })))
}

async fn list_recipients(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(notification_id): Path<String>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let recipients = state
        .notification_service
        .list_recipients(&user, &notification_id)?;

    Ok(Json(json!({
        "success": true,
        "data": recipients
    })))
}
