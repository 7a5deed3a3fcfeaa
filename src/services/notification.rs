use crate::{
    config::Config,
    error::{AppError, Result},
    models::{notification::*, user::UserAccount},
    services::{
        DeliveryLedger, EmailDispatcher, NotificationStore, RecipientResolver, UserDirectory,
    },
    utils::pagination::{paginate, PaginatedResult},
};
use tracing::{debug, info, warn};
use validator::Validate;

/// 通知编排服务
///
/// 所有读写都经过这里，分类校验、收件人解析和权限策略只在
/// 这一处生效；路由层不直接接触存储或台账。
#[derive(Clone)]
pub struct NotificationService {
    store: NotificationStore,
    ledger: DeliveryLedger,
    resolver: RecipientResolver,
    dispatcher: EmailDispatcher,
    users: UserDirectory,
    config: Config,
}

impl NotificationService {
    pub fn new(
        store: NotificationStore,
        ledger: DeliveryLedger,
        resolver: RecipientResolver,
        dispatcher: EmailDispatcher,
        users: UserDirectory,
        config: &Config,
    ) -> Self {
        Self {
            store,
            ledger,
            resolver,
            dispatcher,
            users,
            config: config.clone(),
        }
    }

    /// 创建通知并 fan-out
    ///
    /// 校验全部发生在任何持久化之前：分类、必填字段或收件人
    /// 不合法时零行落库。fan-out 阶段每个收件人独立处理，单个
    /// 失败只计入聚合结果，不中断循环也不向调用方抛错。
    pub async fn create(
        &self,
        caller: &UserAccount,
        request: CreateNotificationRequest,
    ) -> Result<FanoutResult> {
        Self::require_activated(caller)?;
        if !caller.is_admin() {
            return Err(AppError::forbidden("Only administrators can create notifications"));
        }
        request.validate()?;

        // 先解析收件人：显式目标不合法时不留下任何通知行
        let (recipients, target_type) = self
            .resolver
            .resolve(&request.category, request.target_user_id.as_deref())?;

        let notification = self.store.create(&caller.id, &request)?;

        let mut affected_users = 0;
        let mut emails_sent = 0;
        for user_id in &recipients {
            let (_, created) =
                self.ledger
                    .record_delivery(&notification.id, user_id, request.marker.as_deref());
            if !created {
                debug!(
                    "Delivery of {} to {} already recorded, skipping",
                    notification.id, user_id
                );
                continue;
            }
            affected_users += 1;

            if !self.config.enable_email_notifications {
                continue;
            }
            match self.users.get(user_id) {
                Some(recipient) => {
                    if self.dispatcher.send_notification(&recipient, &notification).await {
                        emails_sent += 1;
                    }
                }
                None => warn!("Recipient {} vanished during fan-out", user_id),
            }
        }

        info!(
            "Notification {} fanned out to {}/{} recipients ({} emails)",
            notification.id,
            affected_users,
            recipients.len(),
            emails_sent
        );

        Ok(FanoutResult {
            notification_id: notification.id,
            target_type,
            recipients_considered: recipients.len(),
            affected_users,
            emails_sent,
        })
    }

    /// 单条通知详情
    ///
    /// 管理员附带完整收件人明细；普通用户必须是收件人，否则
    /// 以 NotFound 处理，避免泄露通知的存在。
    pub fn get(&self, caller: &UserAccount, notification_id: &str) -> Result<NotificationDetail> {
        Self::require_activated(caller)?;
        let notification = self
            .store
            .get(notification_id)
            .ok_or_else(|| AppError::not_found("Notification"))?;

        if caller.is_admin() {
            let recipients = self.recipient_entries(notification_id);
            let delivery = self
                .ledger
                .get(notification_id, &caller.id)
                .map(Self::delivery_view);
            return Ok(NotificationDetail {
                notification,
                delivery,
                recipients: Some(recipients),
            });
        }

        let record = self
            .ledger
            .get(notification_id, &caller.id)
            .ok_or_else(|| AppError::not_found("Notification"))?;
        Ok(NotificationDetail {
            notification,
            delivery: Some(Self::delivery_view(record)),
            recipients: None,
        })
    }

    pub fn update(
        &self,
        caller: &UserAccount,
        notification_id: &str,
        request: UpdateNotificationRequest,
    ) -> Result<NotificationDetail> {
        Self::require_activated(caller)?;
        if self.store.get(notification_id).is_none() {
            return Err(AppError::not_found("Notification"));
        }

        let touches_content =
            request.title.is_some() || request.content.is_some() || request.category.is_some();
        let touches_other_record = request
            .user_id
            .as_deref()
            .map_or(false, |target| target != caller.id);
        if (touches_content || request.marker.is_some() || touches_other_record)
            && !caller.is_admin()
        {
            return Err(AppError::forbidden(
                "Only administrators can update notification content or markers",
            ));
        }

        if touches_content {
            self.store.update(notification_id, &request)?;
        }

        let record_owner = request.user_id.as_deref().unwrap_or(&caller.id);
        if let Some(read) = request.read {
            self.ledger.mark_read(notification_id, record_owner, read)?;
        }
        if let Some(marker) = request.marker {
            self.ledger
                .set_marker(notification_id, record_owner, Some(marker))?;
        }

        self.get(caller, notification_id)
    }

    /// 管理员硬删除，投递记录级联移除
    pub fn delete(&self, caller: &UserAccount, notification_id: &str) -> Result<usize> {
        Self::require_activated(caller)?;
        if !caller.is_admin() {
            return Err(AppError::forbidden("Only administrators can delete notifications"));
        }

        self.store.delete(notification_id)?;
        let removed = self.ledger.remove_for_notification(notification_id);
        info!(
            "Deleted notification {} and {} delivery records",
            notification_id, removed
        );
        Ok(removed)
    }

    /// 调用者自己的通知流
    pub fn list_for_caller(
        &self,
        caller: &UserAccount,
        query: &ListQuery,
    ) -> Result<PaginatedResult<NotificationFeedItem>> {
        Self::require_activated(caller)?;
        let ascending = query.order.as_deref() == Some("asc");
        let records = self.ledger.for_user(&caller.id, query.read, ascending);
        let items = self.join_feed(records);

        let page = query.page.unwrap_or(1).max(1);
        let per_page = self.config.clamp_per_page(query.per_page);
        Ok(paginate(&items, page, per_page))
    }

    pub fn search(
        &self,
        caller: &UserAccount,
        query: &SearchQuery,
    ) -> Result<PaginatedResult<NotificationFeedItem>> {
        Self::require_activated(caller)?;

        let read = match query.status.as_deref() {
            Some("read") => Some(true),
            Some("unread") => Some(false),
            Some(other) => {
                return Err(AppError::bad_request(&format!(
                    "Unknown status filter: {}",
                    other
                )))
            }
            None => None,
        };

        let records = self.ledger.for_user(&caller.id, read, false);
        let title_needle = query.title.as_deref().map(|t| t.to_lowercase());
        let mut items: Vec<NotificationFeedItem> = self
            .join_feed(records)
            .into_iter()
            .filter(|item| {
                title_needle.as_deref().map_or(true, |needle| {
                    item.notification.title.to_lowercase().contains(needle)
                })
            })
            .filter(|item| {
                query
                    .marker
                    .as_deref()
                    .map_or(true, |marker| item.marker.as_deref() == Some(marker))
            })
            .collect();

        let ascending = query.order.as_deref() == Some("asc");
        match query.orderby.as_deref() {
            Some("title") => items.sort_by(|a, b| {
                let ordering = a.notification.title.cmp(&b.notification.title);
                if ascending { ordering } else { ordering.reverse() }
            }),
            Some("created_at") => items.sort_by(|a, b| {
                let ordering = a.notification.created_at.cmp(&b.notification.created_at);
                if ascending { ordering } else { ordering.reverse() }
            }),
            _ => {
                // 默认保持按投递时间的顺序
                if ascending {
                    items.reverse();
                }
            }
        }

        let page = query.page.unwrap_or(1).max(1);
        let per_page = self.config.clamp_per_page(query.per_page);
        Ok(paginate(&items, page, per_page))
    }

    /// 管理员专用：某条通知的收件人明细
    pub fn list_recipients(
        &self,
        caller: &UserAccount,
        notification_id: &str,
    ) -> Result<Vec<RecipientEntry>> {
        Self::require_activated(caller)?;
        if !caller.is_admin() {
            return Err(AppError::forbidden("Only administrators can list recipients"));
        }
        if self.store.get(notification_id).is_none() {
            return Err(AppError::not_found("Notification"));
        }
        Ok(self.recipient_entries(notification_id))
    }

    fn require_activated(caller: &UserAccount) -> Result<()> {
        if !caller.is_activated() {
            return Err(AppError::AccountNotActivated);
        }
        Ok(())
    }

    fn delivery_view(record: DeliveryRecord) -> DeliveryView {
        DeliveryView {
            read: record.read,
            marker: record.marker,
            delivered_at: record.delivered_at,
        }
    }

    fn recipient_entries(&self, notification_id: &str) -> Vec<RecipientEntry> {
        self.ledger
            .recipients(notification_id)
            .into_iter()
            .map(|record| {
                let username = self.users.get(&record.user_id).map(|u| u.username);
                RecipientEntry {
                    user_id: record.user_id,
                    username,
                    read: record.read,
                    marker: record.marker,
                    delivered_at: record.delivered_at,
                }
            })
            .collect()
    }

    fn join_feed(&self, records: Vec<DeliveryRecord>) -> Vec<NotificationFeedItem> {
        records
            .into_iter()
            .filter_map(|record| {
                self.store
                    .get(&record.notification_id)
                    .map(|notification| NotificationFeedItem {
                        notification,
                        read: record.read,
                        marker: record.marker,
                        delivered_at: record.delivered_at,
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::user::{AccountStatus, CreateUserRequest, NotificationPreferences},
        services::email::MemoryTransport,
    };
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Fixture {
        service: NotificationService,
        store: NotificationStore,
        ledger: DeliveryLedger,
        users: UserDirectory,
        transport: Arc<MemoryTransport>,
    }

    fn fixture() -> Fixture {
        let config = Config::default();
        let users = UserDirectory::new(&config);
        let store = NotificationStore::new(&config);
        let ledger = DeliveryLedger::new();
        let transport = Arc::new(MemoryTransport::new());
        let dispatcher = EmailDispatcher::new(transport.clone(), &config).unwrap();
        let service = NotificationService::new(
            store.clone(),
            ledger.clone(),
            RecipientResolver::new(users.clone()),
            dispatcher,
            users.clone(),
            &config,
        );
        Fixture {
            service,
            store,
            ledger,
            users,
            transport,
        }
    }

    fn seed_user(
        fixture: &Fixture,
        id: &str,
        status: AccountStatus,
        roles: Vec<&str>,
        system_opt_in: Option<bool>,
        email_enabled: bool,
    ) -> UserAccount {
        let mut categories = HashMap::new();
        if let Some(opted) = system_opt_in {
            categories.insert("system".to_string(), opted);
        }
        fixture
            .users
            .create(CreateUserRequest {
                id: Some(id.to_string()),
                email: format!("{}@example.com", id),
                username: id.to_string(),
                display_name: None,
                status: Some(status),
                roles: roles.into_iter().map(|r| r.to_string()).collect(),
                preferences: Some(NotificationPreferences {
                    email_enabled,
                    categories,
                }),
            })
            .unwrap()
    }

    fn create_request(target: Option<&str>) -> CreateNotificationRequest {
        CreateNotificationRequest {
            category: "system".to_string(),
            title: "Maintenance".to_string(),
            message: "Scheduled downtime".to_string(),
            content: "The platform will be down for maintenance tonight.".to_string(),
            target_user_id: target.map(|t| t.to_string()),
            related_entity_id: None,
            marker: None,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_only_opted_in_activated_users() {
        let f = fixture();
        let admin = seed_user(&f, "admin", AccountStatus::Activated, vec!["admin"], None, false);
        seed_user(&f, "u1", AccountStatus::Activated, vec![], Some(true), true);
        seed_user(&f, "u2", AccountStatus::Activated, vec![], Some(true), false);
        seed_user(&f, "u3", AccountStatus::Activated, vec![], Some(true), true);
        seed_user(&f, "u4", AccountStatus::Activated, vec![], Some(false), true);
        seed_user(&f, "u5", AccountStatus::Activated, vec![], None, true);

        let result = f.service.create(&admin, create_request(None)).await.unwrap();

        assert_eq!(result.target_type, TargetType::AllUsers);
        assert_eq!(result.affected_users, 3);
        assert_eq!(result.recipients_considered, 3);
        assert_eq!(f.store.count(), 1);
        assert_eq!(f.ledger.recipients(&result.notification_id).len(), 3);
        // 只有邮件渠道开启的订阅者收到邮件
        assert_eq!(result.emails_sent, 2);
        assert_eq!(f.transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn invalid_category_persists_nothing() {
        let f = fixture();
        let admin = seed_user(&f, "admin", AccountStatus::Activated, vec!["admin"], None, false);
        seed_user(&f, "u1", AccountStatus::Activated, vec![], Some(true), false);

        let mut request = create_request(None);
        request.category = "bogus".to_string();
        let result = f.service.create(&admin, request).await;

        assert!(matches!(result, Err(AppError::InvalidCategory(_))));
        assert_eq!(f.store.count(), 0);
        assert_eq!(f.ledger.count_for_user("u1", None), 0);
    }

    #[tokio::test]
    async fn pending_explicit_target_is_rejected_with_zero_rows() {
        let f = fixture();
        let admin = seed_user(&f, "admin", AccountStatus::Activated, vec!["admin"], None, false);
        seed_user(&f, "42", AccountStatus::Pending, vec![], Some(true), true);

        let result = f.service.create(&admin, create_request(Some("42"))).await;

        assert!(matches!(result, Err(AppError::InvalidRecipient(_))));
        assert_eq!(f.store.count(), 0);
        assert_eq!(f.ledger.count_for_user("42", None), 0);
    }

    #[tokio::test]
    async fn explicit_target_creates_exactly_one_record() {
        let f = fixture();
        let admin = seed_user(&f, "admin", AccountStatus::Activated, vec!["admin"], None, false);
        // 显式目标无需订阅该分类
        seed_user(&f, "u1", AccountStatus::Activated, vec![], None, false);

        let result = f
            .service
            .create(&admin, create_request(Some("u1")))
            .await
            .unwrap();

        assert_eq!(result.target_type, TargetType::SpecificUser);
        assert_eq!(result.affected_users, 1);
        assert_eq!(f.ledger.recipients(&result.notification_id).len(), 1);
    }

    #[tokio::test]
    async fn non_admin_cannot_create() {
        let f = fixture();
        let user = seed_user(&f, "u1", AccountStatus::Activated, vec![], Some(true), false);

        let result = f.service.create(&user, create_request(None)).await;
        assert!(matches!(result, Err(AppError::Authorization(_))));
        assert_eq!(f.store.count(), 0);
    }

    #[tokio::test]
    async fn non_recipient_sees_not_found() {
        let f = fixture();
        let admin = seed_user(&f, "admin", AccountStatus::Activated, vec!["admin"], None, false);
        seed_user(&f, "u1", AccountStatus::Activated, vec![], None, false);
        let outsider = seed_user(&f, "u2", AccountStatus::Activated, vec![], None, false);

        let result = f
            .service
            .create(&admin, create_request(Some("u1")))
            .await
            .unwrap();

        assert!(matches!(
            f.service.get(&outsider, &result.notification_id),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn read_toggle_is_owner_or_admin_only() {
        let f = fixture();
        let admin = seed_user(&f, "admin", AccountStatus::Activated, vec!["admin"], None, false);
        let owner = seed_user(&f, "u1", AccountStatus::Activated, vec![], None, false);
        let other = seed_user(&f, "u2", AccountStatus::Activated, vec![], None, false);

        let result = f
            .service
            .create(&admin, create_request(Some("u1")))
            .await
            .unwrap();
        let id = &result.notification_id;

        // 收件人自己切换已读
        let detail = f
            .service
            .update(
                &owner,
                id,
                UpdateNotificationRequest {
                    read: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(detail.delivery.unwrap().read);

        // 非收件人既改不了别人的记录，也看不到这条通知
        let result_other = f.service.update(
            &other,
            id,
            UpdateNotificationRequest {
                read: Some(true),
                user_id: Some("u1".to_string()),
                ..Default::default()
            },
        );
        assert!(result_other.is_err());

        // 管理员可以代收件人标记
        f.service
            .update(
                &admin,
                id,
                UpdateNotificationRequest {
                    read: Some(false),
                    user_id: Some("u1".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!f.ledger.get(id, "u1").unwrap().read);
    }

    #[tokio::test]
    async fn delete_cascades_delivery_records() {
        let f = fixture();
        let admin = seed_user(&f, "admin", AccountStatus::Activated, vec!["admin"], None, false);
        for id in ["u1", "u2", "u3", "u4", "u5"] {
            seed_user(&f, id, AccountStatus::Activated, vec![], Some(true), false);
        }

        let result = f.service.create(&admin, create_request(None)).await.unwrap();
        let id = &result.notification_id;
        assert_eq!(f.ledger.recipients(id).len(), 5);

        let removed = f.service.delete(&admin, id).unwrap();
        assert_eq!(removed, 5);
        assert!(f.ledger.recipients(id).is_empty());
        assert!(matches!(
            f.service.get(&admin, id),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn search_filters_by_title_and_marker() {
        let f = fixture();
        let admin = seed_user(&f, "admin", AccountStatus::Activated, vec!["admin"], None, false);
        let user = seed_user(&f, "u1", AccountStatus::Activated, vec![], Some(true), false);

        let mut first = create_request(None);
        first.title = "Maintenance window".to_string();
        first.marker = Some("ops".to_string());
        f.service.create(&admin, first).await.unwrap();

        let mut second = create_request(None);
        second.title = "New asset published".to_string();
        f.service.create(&admin, second).await.unwrap();

        let by_title = f
            .service
            .search(
                &user,
                &SearchQuery {
                    title: Some("maintenance".to_string()),
                    marker: None,
                    status: None,
                    page: None,
                    per_page: None,
                    orderby: None,
                    order: None,
                },
            )
            .unwrap();
        assert_eq!(by_title.total, 1);
        assert_eq!(by_title.data[0].notification.title, "Maintenance window");

        let by_marker = f
            .service
            .search(
                &user,
                &SearchQuery {
                    title: None,
                    marker: Some("ops".to_string()),
                    status: None,
                    page: None,
                    per_page: None,
                    orderby: None,
                    order: None,
                },
            )
            .unwrap();
        assert_eq!(by_marker.total, 1);
        assert_eq!(by_marker.data[0].marker.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn pending_caller_is_blocked_everywhere() {
        let f = fixture();
        let pending = seed_user(&f, "p1", AccountStatus::Pending, vec!["admin"], None, false);

        assert!(matches!(
            f.service.create(&pending, create_request(None)).await,
            Err(AppError::AccountNotActivated)
        ));
        assert!(matches!(
            f.service.list_for_caller(
                &pending,
                &ListQuery {
                    page: None,
                    per_page: None,
                    read: None,
                    order: None
                }
            ),
            Err(AppError::AccountNotActivated)
        ));
    }
}
