use crate::{
    config::Config,
    error::{AppError, Result},
    models::notification::{CreateNotificationRequest, Notification, UpdateNotificationRequest},
};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// 通知内容存储
///
/// 分类在每次创建/编辑时对照配置中的枚举校验，不做缓存。
#[derive(Clone)]
pub struct NotificationStore {
    notifications: Arc<DashMap<String, Notification>>,
    config: Config,
}

impl NotificationStore {
    pub fn new(config: &Config) -> Self {
        Self {
            notifications: Arc::new(DashMap::new()),
            config: config.clone(),
        }
    }

    pub fn create(&self, author_id: &str, request: &CreateNotificationRequest) -> Result<Notification> {
        self.check_category(&request.category)?;
        Self::check_required("title", &request.title)?;
        Self::check_required("message", &request.message)?;
        Self::check_required("content", &request.content)?;

        if request.title.len() > self.config.max_title_length {
            return Err(AppError::validation("Title too long"));
        }
        if request.message.len() > self.config.max_message_length {
            return Err(AppError::validation("Message too long"));
        }
        if request.content.len() > self.config.max_content_length {
            return Err(AppError::validation("Content too long"));
        }

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            category: request.category.clone(),
            title: request.title.clone(),
            message: request.message.clone(),
            content: request.content.clone(),
            related_entity_id: request.related_entity_id.clone(),
            created_at: Utc::now(),
        };

        self.notifications
            .insert(notification.id.clone(), notification.clone());
        info!(
            "Created notification {} in category {}",
            notification.id, notification.category
        );
        Ok(notification)
    }

    pub fn get(&self, notification_id: &str) -> Option<Notification> {
        self.notifications.get(notification_id).map(|n| n.clone())
    }

    /// 仅内容字段可编辑；权限检查由编排层完成
    pub fn update(
        &self,
        notification_id: &str,
        request: &UpdateNotificationRequest,
    ) -> Result<Notification> {
        if let Some(category) = &request.category {
            self.check_category(category)?;
        }

        let mut notification = self
            .notifications
            .get_mut(notification_id)
            .ok_or_else(|| AppError::not_found("Notification"))?;

        if let Some(title) = &request.title {
            Self::check_required("title", title)?;
            notification.title = title.clone();
        }
        if let Some(content) = &request.content {
            Self::check_required("content", content)?;
            notification.content = content.clone();
        }
        if let Some(category) = &request.category {
            notification.category = category.clone();
        }

        debug!("Updated notification {}", notification_id);
        Ok(notification.clone())
    }

    pub fn delete(&self, notification_id: &str) -> Result<Notification> {
        self.notifications
            .remove(notification_id)
            .map(|(_, notification)| notification)
            .ok_or_else(|| AppError::not_found("Notification"))
    }

    pub fn count(&self) -> usize {
        self.notifications.len()
    }

    fn check_category(&self, category: &str) -> Result<()> {
        if !self.config.is_known_category(category) {
            return Err(AppError::InvalidCategory(format!(
                "Unknown notification category: {}",
                category
            )));
        }
        Ok(())
    }

    fn check_required(field: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(AppError::MissingField(format!("{} is required", field)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> NotificationStore {
        NotificationStore::new(&Config::default())
    }

    fn request() -> CreateNotificationRequest {
        CreateNotificationRequest {
            category: "system".to_string(),
            title: "Maintenance".to_string(),
            message: "Scheduled downtime".to_string(),
            content: "The platform will be down for maintenance.".to_string(),
            target_user_id: None,
            related_entity_id: None,
            marker: None,
        }
    }

    #[test]
    fn create_rejects_unknown_category_and_persists_nothing() {
        let store = store();
        let mut req = request();
        req.category = "bogus".to_string();

        let result = store.create("admin", &req);
        assert!(matches!(result, Err(AppError::InvalidCategory(_))));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn create_rejects_empty_required_fields() {
        let store = store();
        let mut req = request();
        req.title = "   ".to_string();

        let result = store.create("admin", &req);
        assert!(matches!(result, Err(AppError::MissingField(_))));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn update_validates_category_before_touching_the_record() {
        let store = store();
        let created = store.create("admin", &request()).unwrap();

        let result = store.update(
            &created.id,
            &UpdateNotificationRequest {
                category: Some("bogus".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AppError::InvalidCategory(_))));
        assert_eq!(store.get(&created.id).unwrap().category, "system");
    }

    #[test]
    fn delete_removes_the_record() {
        let store = store();
        let created = store.create("admin", &request()).unwrap();
        store.delete(&created.id).unwrap();
        assert!(store.get(&created.id).is_none());
        assert!(matches!(
            store.delete(&created.id),
            Err(AppError::NotFound(_))
        ));
    }
}
