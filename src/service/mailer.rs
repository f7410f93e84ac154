use crate::config::Config;
use crate::error::LaasError;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::sync::Arc;
use tracing::{info, warn};

/// Outbound delivery of verification codes. Only success or failure is observed.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_code(&self, to: &str, code: &str) -> Result<(), LaasError>;
}

/// SMTP delivery over STARTTLS. lettre's transport is blocking, so sends run on the blocking pool.
pub struct SmtpMailer {
    from: Mailbox,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, user: &str, password: &str) -> Result<Self, LaasError> {
        let from: Mailbox = user
            .parse()
            .map_err(|e| LaasError::Mail(format!("invalid sender {user}: {e}")))?;
        let transport = SmtpTransport::starttls_relay(host)
            .map_err(|e| LaasError::Mail(format!("invalid SMTP relay {host}: {e}")))?
            .port(port)
            .credentials(Credentials::new(user.to_string(), password.to_string()))
            .build();
        Ok(Self { from, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_code(&self, to: &str, code: &str) -> Result<(), LaasError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| LaasError::Mail(format!("invalid recipient {to}: {e}")))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Login Code")
            .header(ContentType::TEXT_HTML)
            .body(format!(
                "Please use the following code to log in: <code>{code}</code>"
            ))
            .map_err(|e| LaasError::Mail(e.to_string()))?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| LaasError::Mail(format!("mail task failed: {e}")))?
            .map_err(|e| LaasError::Mail(e.to_string()))?;
        Ok(())
    }
}

/// Writes codes to the log instead of sending them; used when no SMTP host is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_code(&self, to: &str, code: &str) -> Result<(), LaasError> {
        info!(to, code, "verification code (SMTP disabled)");
        Ok(())
    }
}

pub fn from_config(cfg: &Config) -> Result<Arc<dyn Mailer>, LaasError> {
    match cfg.smtp_host.as_deref() {
        Some(host) if !host.is_empty() => Ok(Arc::new(SmtpMailer::new(
            host,
            cfg.smtp_port,
            &cfg.smtp_user,
            &cfg.smtp_password,
        )?)),
        _ => {
            warn!("smtp_host not set; verification codes will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}
