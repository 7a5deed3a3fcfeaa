use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// 用户账号生命周期状态
/// 只有 activated 状态的账号才会收到任何投递
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Activated,
    Pending,
    Deactivated,
}

/// 每用户的通知偏好
///
/// `categories` 按分类控制站内投递；没有显式写入的分类一律视为未订阅。
/// `email_enabled` 是邮件渠道的总开关。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email_enabled: bool,
    #[serde(default)]
    pub categories: HashMap<String, bool>,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email_enabled: false,
            categories: HashMap::new(),
        }
    }
}

impl NotificationPreferences {
    /// 分类订阅标记，缺省为未订阅
    pub fn subscribed(&self, category: &str) -> bool {
        self.categories.get(category).copied().unwrap_or(false)
    }

    pub fn wants_email(&self, category: &str) -> bool {
        self.email_enabled && self.subscribed(category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub status: AccountStatus,
    pub roles: Vec<String>,
    pub preferences: NotificationPreferences,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "admin")
    }

    pub fn is_activated(&self) -> bool {
        self.status == AccountStatus::Activated
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateUserRequest {
    pub id: Option<String>,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 64, message = "Username must be 1-64 characters"))]
    pub username: String,
    pub display_name: Option<String>,
    pub status: Option<AccountStatus>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub preferences: Option<NotificationPreferences>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AccountStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub email_enabled: Option<bool>,
    pub categories: Option<HashMap<String, bool>>,
}
