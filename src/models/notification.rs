use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 通知主体，创建后除管理员编辑外不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub author_id: String,
    pub category: String,
    pub title: String,
    pub message: String,
    pub content: String,
    pub related_entity_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 每个 (notification, recipient) 对应一条投递记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub notification_id: String,
    pub user_id: String,
    pub read: bool,
    pub marker: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    SpecificUser,
    AllUsers,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateNotificationRequest {
    pub category: String,
    #[validate(length(max = 200, message = "Title too long"))]
    pub title: String,
    #[validate(length(max = 500, message = "Message too long"))]
    pub message: String,
    pub content: String,
    pub target_user_id: Option<String>,
    pub related_entity_id: Option<String>,
    pub marker: Option<String>,
}

/// PUT /notifications/:id 载荷
///
/// `read` 作用于调用者自己的投递记录；`user_id` 允许管理员代为操作
/// 其他收件人的记录；`marker` 与内容字段仅限管理员。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNotificationRequest {
    pub read: Option<bool>,
    pub marker: Option<String>,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
}

/// 创建操作的聚合结果：只报告总量，不报告单个收件人的失败
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutResult {
    pub notification_id: String,
    pub target_type: TargetType,
    pub recipients_considered: usize,
    pub affected_users: usize,
    pub emails_sent: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub read: Option<bool>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub title: Option<String>,
    pub marker: Option<String>,
    pub status: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub orderby: Option<String>,
    pub order: Option<String>,
}

/// 用户通知流中的一项：投递记录与通知内容联接后的视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFeedItem {
    pub notification: Notification,
    pub read: bool,
    pub marker: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientEntry {
    pub user_id: String,
    pub username: Option<String>,
    pub read: bool,
    pub marker: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryView {
    pub read: bool,
    pub marker: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

/// GET /notifications/:id 响应
/// 管理员附带完整收件人明细，普通收件人只看到自己的投递状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDetail {
    pub notification: Notification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<RecipientEntry>>,
}
