use crate::{config::Config, error::AppError, models::user::UserAccount, state::AppState};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use once_cell::sync::OnceCell;
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

type KeyedRateLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;
static RATE_LIMITER: OnceCell<KeyedRateLimiter> = OnceCell::new();

const RATE_LIMIT_BURST: u32 = 10;

/// 由配置换算限流配额：窗口内允许 N 次请求
///
/// 0 值的配置按 1 处理，不让非法环境变量引发 panic。
fn rate_limit_quota(config: &Config) -> Quota {
    let requests = NonZeroU32::new(config.rate_limit_requests).unwrap_or(NonZeroU32::MIN);
    let window = Duration::from_secs(config.rate_limit_window.max(1));
    let burst = NonZeroU32::new(RATE_LIMIT_BURST.min(requests.get())).unwrap_or(NonZeroU32::MIN);

    Quota::with_period(window / requests.get())
        .unwrap_or_else(|| Quota::per_minute(requests))
        .allow_burst(burst)
}

/// 认证中间件
///
/// 验证 Bearer JWT 并从用户目录解析账号，放入请求扩展；
/// 验证失败不拒绝请求，交由各处理器决定是否要求登录。
pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    if let Some(auth_header) = headers.get("authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                match app_state.auth_service.verify_jwt(token) {
                    Ok(claims) => match app_state.user_service.get(&claims.sub) {
                        Some(account) => {
                            debug!("Authenticated user: {} ({})", account.id, account.email);
                            request.extensions_mut().insert(account);
                        }
                        None => {
                            warn!("Token subject {} has no account", claims.sub);
                        }
                    },
                    Err(e) => {
                        debug!("JWT verification failed: {}", e);
                    }
                }
            }
        }
    }

    Ok(next.run(request).await)
}

/// 速率限制中间件，按登录用户计数，匿名请求退回客户端 IP
pub async fn rate_limit_middleware(
    State(app_state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    let rate_limiter = RATE_LIMITER
        .get_or_init(|| RateLimiter::dashmap(rate_limit_quota(&app_state.config)));

    let key = request
        .extensions()
        .get::<UserAccount>()
        .map(|account| format!("user:{}", account.id))
        .unwrap_or_else(|| format!("ip:{}", get_client_ip(&request)));

    match rate_limiter.check_key(&key) {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            warn!("Rate limit exceeded for {}", key);
            Err(AppError::RateLimitExceeded)
        }
    }
}

/// 请求日志中间件
pub async fn request_logging_middleware(
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let start_time = std::time::Instant::now();
    let response = next.run(request).await;
    let elapsed = start_time.elapsed();

    info!(
        "Request completed: {} {} {} - {}ms",
        method,
        uri,
        response.status().as_u16(),
        elapsed.as_millis()
    );

    response
}

/// 获取客户端 IP 地址
fn get_client_ip(request: &Request<Body>) -> String {
    let headers = request.headers();

    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(ip_str) = forwarded_for.to_str() {
            if let Some(ip) = ip_str.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    request
        .extensions()
        .get::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// 可选认证提取器
pub struct OptionalAuth(pub Option<UserAccount>);

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account = parts.extensions.get::<UserAccount>().cloned();
        Ok(OptionalAuth(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_follows_configured_window() {
        let config = Config {
            rate_limit_requests: 120,
            rate_limit_window: 60,
            ..Config::default()
        };
        let quota = rate_limit_quota(&config);
        assert_eq!(quota.replenish_interval(), Duration::from_millis(500));
        assert_eq!(quota.burst_size().get(), RATE_LIMIT_BURST);
    }

    #[test]
    fn zero_valued_limits_do_not_panic() {
        let config = Config {
            rate_limit_requests: 0,
            rate_limit_window: 0,
            ..Config::default()
        };
        let quota = rate_limit_quota(&config);
        assert_eq!(quota.burst_size().get(), 1);
        assert_eq!(quota.replenish_interval(), Duration::from_secs(1));
    }
}
