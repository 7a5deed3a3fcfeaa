use crate::{
    error::{AppError, Result},
    models::notification::TargetType,
    services::UserDirectory,
};

/// 收件人解析：纯查询，不产生任何状态变更
///
/// 显式指定收件人时只要求账号处于 activated 状态；广播时
/// 额外要求该用户对目标分类显式订阅。未写入的订阅标记视为
/// 未订阅。
#[derive(Clone)]
pub struct RecipientResolver {
    users: UserDirectory,
}

impl RecipientResolver {
    pub fn new(users: UserDirectory) -> Self {
        Self { users }
    }

    pub fn resolve(
        &self,
        category: &str,
        explicit_user_id: Option<&str>,
    ) -> Result<(Vec<String>, TargetType)> {
        if let Some(user_id) = explicit_user_id {
            let user = self.users.get(user_id).ok_or_else(|| {
                AppError::InvalidRecipient(format!("User {} does not exist", user_id))
            })?;
            if !user.is_activated() {
                return Err(AppError::InvalidRecipient(format!(
                    "User {} is not activated",
                    user_id
                )));
            }
            return Ok((vec![user_id.to_string()], TargetType::SpecificUser));
        }

        let mut recipients: Vec<String> = self
            .users
            .activated()
            .into_iter()
            .filter(|user| user.preferences.subscribed(category))
            .map(|user| user.id)
            .collect();
        recipients.sort();
        Ok((recipients, TargetType::AllUsers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        models::user::{AccountStatus, CreateUserRequest, NotificationPreferences},
    };
    use std::collections::HashMap;

    fn seed(directory: &UserDirectory, id: &str, status: AccountStatus, system_opt_in: Option<bool>) {
        let mut categories = HashMap::new();
        if let Some(opted) = system_opt_in {
            categories.insert("system".to_string(), opted);
        }
        directory
            .create(CreateUserRequest {
                id: Some(id.to_string()),
                email: format!("{}@example.com", id),
                username: id.to_string(),
                display_name: None,
                status: Some(status),
                roles: vec![],
                preferences: Some(NotificationPreferences {
                    email_enabled: false,
                    categories,
                }),
            })
            .unwrap();
    }

    #[test]
    fn broadcast_only_reaches_activated_subscribers() {
        let directory = UserDirectory::new(&Config::default());
        seed(&directory, "opted-a", AccountStatus::Activated, Some(true));
        seed(&directory, "opted-b", AccountStatus::Activated, Some(true));
        seed(&directory, "opted-out", AccountStatus::Activated, Some(false));
        seed(&directory, "unset", AccountStatus::Activated, None);
        seed(&directory, "pending", AccountStatus::Pending, Some(true));

        let resolver = RecipientResolver::new(directory);
        let (recipients, target_type) = resolver.resolve("system", None).unwrap();

        assert_eq!(recipients, vec!["opted-a", "opted-b"]);
        assert_eq!(target_type, TargetType::AllUsers);
    }

    #[test]
    fn explicit_target_must_exist_and_be_activated() {
        let directory = UserDirectory::new(&Config::default());
        seed(&directory, "active", AccountStatus::Activated, None);
        seed(&directory, "pending", AccountStatus::Pending, None);

        let resolver = RecipientResolver::new(directory);

        let (recipients, target_type) = resolver.resolve("system", Some("active")).unwrap();
        assert_eq!(recipients, vec!["active"]);
        assert_eq!(target_type, TargetType::SpecificUser);

        assert!(matches!(
            resolver.resolve("system", Some("pending")),
            Err(AppError::InvalidRecipient(_))
        ));
        assert!(matches!(
            resolver.resolve("system", Some("ghost")),
            Err(AppError::InvalidRecipient(_))
        ));
    }
}
