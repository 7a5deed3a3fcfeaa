use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,

    // Authentication configuration
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    // Notification settings
    pub notification_categories: Vec<String>,
    pub default_per_page: usize,
    pub max_per_page: usize,
    pub max_title_length: usize,
    pub max_message_length: usize,
    pub max_content_length: usize,

    // Email configuration
    pub enable_email_notifications: bool,
    pub email_transport: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_from_name: String,
    pub smtp_from_email: String,

    // Frontend URLs
    pub frontend_url: String,

    // Rate limiting
    pub rate_limit_requests: u32,
    pub rate_limit_window: u64,

    // CORS configuration
    pub cors_allowed_origins: String,

    // Bootstrap administrator account (optional)
    pub admin_user_id: Option<String>,
    pub admin_email: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "168".to_string())
                .parse()?,

            notification_categories: env::var("NOTIFICATION_CATEGORIES")
                .unwrap_or_else(|_| "asset,personal,system,curation,error_report".to_string())
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            default_per_page: env::var("DEFAULT_PER_PAGE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            max_per_page: env::var("MAX_PER_PAGE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            max_title_length: env::var("MAX_TITLE_LENGTH")
                .unwrap_or_else(|_| "200".to_string())
                .parse()?,
            max_message_length: env::var("MAX_MESSAGE_LENGTH")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,
            max_content_length: env::var("MAX_CONTENT_LENGTH")
                .unwrap_or_else(|_| "50000".to_string())
                .parse()?,

            enable_email_notifications: env::var("ENABLE_EMAIL_NOTIFICATIONS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            email_transport: env::var("EMAIL_TRANSPORT")
                .unwrap_or_else(|_| "smtp".to_string()),
            smtp_host: env::var("SMTP_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()?,
            smtp_username: env::var("SMTP_USERNAME")
                .unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD")
                .unwrap_or_default(),
            smtp_from_name: env::var("SMTP_FROM_NAME")
                .unwrap_or_else(|_| "Rainbow Notify".to_string()),
            smtp_from_email: env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@rainbow-hub.com".to_string()),

            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),

            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            rate_limit_window: env::var("RATE_LIMIT_WINDOW")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),

            admin_user_id: env::var("ADMIN_USER_ID").ok(),
            admin_email: env::var("ADMIN_EMAIL").ok(),
        })
    }

    /// 检查分类是否属于当前配置的枚举
    pub fn is_known_category(&self, category: &str) -> bool {
        self.notification_categories.iter().any(|c| c == category)
    }

    pub fn clamp_per_page(&self, per_page: Option<usize>) -> usize {
        per_page
            .unwrap_or(self.default_per_page)
            .clamp(1, self.max_per_page)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            jwt_secret: "rainbow-notify-test-secret".to_string(),
            jwt_expiry_hours: 168,
            notification_categories: vec![
                "asset".to_string(),
                "personal".to_string(),
                "system".to_string(),
                "curation".to_string(),
                "error_report".to_string(),
            ],
            default_per_page: 20,
            max_per_page: 100,
            max_title_length: 200,
            max_message_length: 500,
            max_content_length: 50000,
            enable_email_notifications: true,
            email_transport: "memory".to_string(),
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_from_name: "Rainbow Notify".to_string(),
            smtp_from_email: "noreply@rainbow-hub.com".to_string(),
            frontend_url: "http://localhost:3001".to_string(),
            rate_limit_requests: 100,
            rate_limit_window: 60,
            cors_allowed_origins: "http://localhost:3001".to_string(),
            admin_user_id: None,
            admin_email: None,
        }
    }
}
