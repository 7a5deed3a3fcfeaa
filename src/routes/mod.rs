pub mod notifications;
pub mod preferences;
pub mod users;

use crate::{state::AppState, utils::middleware};
use axum::{middleware::from_fn, middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;

/// 组装完整路由，集成测试直接驱动这个 Router
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .nest("/api/notify/notifications", notifications::router())
        .nest("/api/notify/preferences", preferences::router())
        .nest("/api/notify/users", users::router())
        .layer(from_fn(middleware::request_logging_middleware))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "Rainbow-Notify is running!"
}
