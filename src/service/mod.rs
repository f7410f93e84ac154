pub mod mailer;
pub mod password;
pub mod pending_actor;
pub mod sessions;

pub use mailer::{LogMailer, Mailer, SmtpMailer};
pub use pending_actor::{PendingAccountsHandle, StagedAccount, Verified};
pub use sessions::SessionCache;
