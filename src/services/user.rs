use crate::{
    config::Config,
    error::{AppError, Result},
    models::user::*,
};
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// 用户目录：账号状态与通知偏好的本地存储
///
/// 扮演账号状态查询与偏好存储两个协作方的角色。收件人解析与
/// 邮件分发都只通过这里读取用户数据。
#[derive(Clone)]
pub struct UserDirectory {
    accounts: Arc<DashMap<String, UserAccount>>,
    config: Config,
}

impl UserDirectory {
    pub fn new(config: &Config) -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            config: config.clone(),
        }
    }

    pub fn create(&self, request: CreateUserRequest) -> Result<UserAccount> {
        if let Some(preferences) = &request.preferences {
            self.check_categories(preferences.categories.keys())?;
        }

        let id = request.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let account = UserAccount {
            id: id.clone(),
            email: request.email,
            username: request.username,
            display_name: request.display_name,
            status: request.status.unwrap_or(AccountStatus::Pending),
            roles: request.roles,
            preferences: request.preferences.unwrap_or_default(),
            created_at: Utc::now(),
        };

        // entry 保证同一 id 并发创建只有一个成功
        match self.accounts.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!("User {} already exists", id)));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(account.clone());
            }
        }

        info!("Created user account {} ({:?})", id, account.status);
        Ok(account)
    }

    pub fn get(&self, user_id: &str) -> Option<UserAccount> {
        self.accounts.get(user_id).map(|a| a.clone())
    }

    pub fn set_status(&self, user_id: &str, status: AccountStatus) -> Result<UserAccount> {
        let mut account = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| AppError::not_found("User"))?;
        account.status = status;
        debug!("User {} status set to {:?}", user_id, status);
        Ok(account.clone())
    }

    pub fn update_preferences(
        &self,
        user_id: &str,
        request: UpdatePreferencesRequest,
    ) -> Result<UserAccount> {
        if let Some(categories) = &request.categories {
            self.check_categories(categories.keys())?;
        }

        let mut account = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| AppError::not_found("User"))?;

        if let Some(email_enabled) = request.email_enabled {
            account.preferences.email_enabled = email_enabled;
        }
        if let Some(categories) = request.categories {
            for (category, opted_in) in categories {
                account.preferences.categories.insert(category, opted_in);
            }
        }

        Ok(account.clone())
    }

    /// 所有 activated 状态的账号
    pub fn activated(&self) -> Vec<UserAccount> {
        self.accounts
            .iter()
            .filter(|entry| entry.value().is_activated())
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn check_categories<'a, I>(&self, categories: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for category in categories {
            if !self.config.is_known_category(category) {
                return Err(AppError::InvalidCategory(format!(
                    "Unknown notification category: {}",
                    category
                )));
            }
        }
        Ok(())
    }
}
