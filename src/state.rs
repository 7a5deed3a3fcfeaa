use crate::{
    config::Config,
    error::Result,
    services::{
        AuthService, DeliveryLedger, EmailDispatcher, EmailTransport, NotificationService,
        NotificationStore, RecipientResolver, UserDirectory,
    },
};
use std::sync::Arc;

/// 应用程序的共享状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 认证服务
    pub auth_service: AuthService,

    /// 用户目录
    pub user_service: UserDirectory,

    /// 通知编排服务
    pub notification_service: NotificationService,
}

impl AppState {
    /// 从配置和邮件出口组装全部服务
    pub fn build(config: Config, transport: Arc<dyn EmailTransport>) -> Result<Arc<Self>> {
        let auth_service = AuthService::new(&config);
        let user_service = UserDirectory::new(&config);
        let store = NotificationStore::new(&config);
        let ledger = DeliveryLedger::new();
        let resolver = RecipientResolver::new(user_service.clone());
        let dispatcher = EmailDispatcher::new(transport, &config)?;
        let notification_service = NotificationService::new(
            store,
            ledger,
            resolver,
            dispatcher,
            user_service.clone(),
            &config,
        );

        Ok(Arc::new(Self {
            config,
            auth_service,
            user_service,
            notification_service,
        }))
    }

    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    pub fn is_development(&self) -> bool {
        self.config.is_development()
    }
}
