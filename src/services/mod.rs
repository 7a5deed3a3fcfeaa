pub mod auth;
pub mod email;
pub mod ledger;
pub mod notification;
pub mod resolver;
pub mod store;
pub mod user;

// 重新导出常用类型
pub use auth::AuthService;
pub use email::{EmailDispatcher, EmailTransport, MemoryTransport, SmtpEmailTransport};
pub use ledger::DeliveryLedger;
pub use notification::NotificationService;
pub use resolver::RecipientResolver;
pub use store::NotificationStore;
pub use user::UserDirectory;
