use crate::{
    config::Config,
    error::{AppError, Result},
    models::{notification::Notification, user::UserAccount},
};
use async_trait::async_trait;
use handlebars::Handlebars;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

const NOTIFICATION_TEMPLATE: &str = r#"
<html>
  <body style="font-family: sans-serif; color: #222;">
    <h2>{{title}}</h2>
    <p>{{message}}</p>
    <div>{{content}}</div>
    {{#if action_url}}
    <p><a href="{{action_url}}">View in {{from_name}}</a></p>
    {{/if}}
    <hr/>
    <p style="color: #888; font-size: 12px;">
      You received this email because your {{category}} notifications are enabled.
    </p>
  </body>
</html>
"#;

/// 邮件出口抽象，SMTP 为生产实现，内存实现用于开发与测试
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn deliver(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

pub struct SmtpEmailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_name: String,
    from_email: String,
}

impl SmtpEmailTransport {
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = if config.smtp_username.is_empty() {
            // 本地 Mailpit/Mailhog，无认证
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let credentials = Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            );
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| AppError::Email(format!("Failed to create SMTP relay: {}", e)))?
                .credentials(credentials)
                .port(config.smtp_port)
                .build()
        };

        Ok(Self {
            transport,
            from_name: config.smtp_from_name.clone(),
            from_email: config.smtp_from_email.clone(),
        })
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn deliver(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let message = Message::builder()
            .from(
                format!("{} <{}>", self.from_name, self.from_email)
                    .parse()
                    .map_err(|e| AppError::Email(format!("Invalid from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| AppError::Email(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| AppError::Email(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Email(format!("SMTP send failed: {}", e)))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// 把邮件留在内存里，开发环境与测试断言用
#[derive(Default)]
pub struct MemoryTransport {
    outbox: Mutex<Vec<OutboundEmail>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.outbox.lock().clone()
    }
}

#[async_trait]
impl EmailTransport for MemoryTransport {
    async fn deliver(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        self.outbox.lock().push(OutboundEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }
}

/// 邮件分发：尽力而为的旁路渠道
///
/// 偏好关闭返回 false 且不尝试发送；渲染或传输失败只记日志并
/// 返回 false，绝不向调用方抛错，保证单个收件人的失败不会
/// 阻断其余收件人的 fan-out。
#[derive(Clone)]
pub struct EmailDispatcher {
    transport: Arc<dyn EmailTransport>,
    templates: Arc<Handlebars<'static>>,
    config: Config,
}

impl EmailDispatcher {
    pub fn new(transport: Arc<dyn EmailTransport>, config: &Config) -> Result<Self> {
        let mut templates = Handlebars::new();
        templates
            .register_template_string("notification_email", NOTIFICATION_TEMPLATE)
            .map_err(|e| AppError::Email(format!("Failed to register email template: {}", e)))?;

        Ok(Self {
            transport,
            templates: Arc::new(templates),
            config: config.clone(),
        })
    }

    /// 给单个收件人发通知邮件，返回是否实际送达传输层
    pub async fn send_notification(&self, recipient: &UserAccount, notification: &Notification) -> bool {
        if !recipient.preferences.wants_email(&notification.category) {
            debug!(
                "User {} opted out of {} emails, skipping",
                recipient.id, notification.category
            );
            return false;
        }

        let action_url = notification
            .related_entity_id
            .as_ref()
            .map(|entity| format!("{}/entities/{}", self.config.frontend_url, entity));

        let html_body = match self.templates.render(
            "notification_email",
            &json!({
                "title": notification.title,
                "message": notification.message,
                "content": notification.content,
                "category": notification.category,
                "action_url": action_url,
                "from_name": self.config.smtp_from_name,
            }),
        ) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to render notification email: {}", e);
                return false;
            }
        };

        match self
            .transport
            .deliver(&recipient.email, &notification.title, &html_body)
            .await
        {
            Ok(()) => {
                debug!("Sent notification email to {}", recipient.email);
                true
            }
            Err(e) => {
                warn!("Failed to send notification email to {}: {}", recipient.email, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{AccountStatus, NotificationPreferences};
    use chrono::Utc;
    use std::collections::HashMap;

    fn notification() -> Notification {
        Notification {
            id: "n1".to_string(),
            author_id: "admin".to_string(),
            category: "system".to_string(),
            title: "Maintenance".to_string(),
            message: "Scheduled downtime".to_string(),
            content: "We will be back soon.".to_string(),
            related_entity_id: Some("asset-9".to_string()),
            created_at: Utc::now(),
        }
    }

    fn recipient(email_enabled: bool, system_opt_in: bool) -> UserAccount {
        let mut categories = HashMap::new();
        categories.insert("system".to_string(), system_opt_in);
        UserAccount {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            username: "u1".to_string(),
            display_name: None,
            status: AccountStatus::Activated,
            roles: vec![],
            preferences: NotificationPreferences {
                email_enabled,
                categories,
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn memory_transport_records_outbound_mail() {
        let transport = MemoryTransport::new();
        tokio_test::block_on(async {
            transport
                .deliver("dev@example.com", "Hello", "<p>hi</p>")
                .await
                .unwrap();
        });

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "dev@example.com");
    }

    #[tokio::test]
    async fn opted_in_recipient_gets_an_email() {
        let transport = Arc::new(MemoryTransport::new());
        let dispatcher = EmailDispatcher::new(transport.clone(), &Config::default()).unwrap();

        let delivered = dispatcher
            .send_notification(&recipient(true, true), &notification())
            .await;

        assert!(delivered);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "u1@example.com");
        assert_eq!(sent[0].subject, "Maintenance");
        assert!(sent[0].html_body.contains("Scheduled downtime"));
        assert!(sent[0].html_body.contains("asset-9"));
    }

    #[tokio::test]
    async fn opt_out_is_a_silent_false_not_an_error() {
        let transport = Arc::new(MemoryTransport::new());
        let dispatcher = EmailDispatcher::new(transport.clone(), &Config::default()).unwrap();

        assert!(!dispatcher
            .send_notification(&recipient(false, true), &notification())
            .await);
        assert!(!dispatcher
            .send_notification(&recipient(true, false), &notification())
            .await);
        assert!(transport.sent().is_empty());
    }
}
