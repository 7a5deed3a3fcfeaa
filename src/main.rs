use axum::http::{HeaderValue, Method};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rainbow_notify::{
    config::Config,
    models::user::{AccountStatus, CreateUserRequest},
    routes,
    services::{EmailTransport, MemoryTransport, SmtpEmailTransport},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "rainbow_notify=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Rainbow-Notify service...");

    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 选择邮件出口
    let transport: Arc<dyn EmailTransport> = match config.email_transport.as_str() {
        "memory" => {
            warn!("Using in-memory email transport, no mail will leave this process");
            Arc::new(MemoryTransport::new())
        }
        _ => Arc::new(SmtpEmailTransport::from_config(&config)?),
    };

    // 创建应用状态
    let app_state = AppState::build(config.clone(), transport)?;

    bootstrap_admin(&app_state);

    // 配置 CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(
            config
                .cors_allowed_origins
                .split(',')
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        );

    let app = routes::app(app_state)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    // 启动主服务器
    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// 按环境变量预置一个管理员账号，方便空实例开箱可用
fn bootstrap_admin(app_state: &Arc<AppState>) {
    let (Some(user_id), Some(email)) = (
        app_state.config.admin_user_id.clone(),
        app_state.config.admin_email.clone(),
    ) else {
        return;
    };

    if app_state.user_service.get(&user_id).is_some() {
        return;
    }

    let request = CreateUserRequest {
        id: Some(user_id.clone()),
        email,
        username: "admin".to_string(),
        display_name: Some("Administrator".to_string()),
        status: Some(AccountStatus::Activated),
        roles: vec!["admin".to_string()],
        preferences: None,
    };

    match app_state.user_service.create(request) {
        Ok(account) => {
            info!("Bootstrapped administrator account {}", account.id);
            if app_state.is_development() {
                if let Ok(token) = app_state
                    .auth_service
                    .issue_token(&account.id, Some(&account.email))
                {
                    info!("Development admin token: {}", token);
                }
            }
        }
        Err(e) => warn!("Failed to bootstrap administrator account: {}", e),
    }
}
