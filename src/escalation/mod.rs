//! Escalation notification channel. Sending is a side effect of free-text
//! escalation and must never fail or delay the ticket write; the engine
//! bounds the wait and reports the outcome as a boolean only.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid address: {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("smtp: {0}")]
    Smtp(String),

    #[error("worker: {0}")]
    Worker(String),
}

/// Everything the support mailbox needs to pick up the conversation.
#[derive(Debug, Clone)]
pub struct EscalationNotice {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub user_id: Uuid,
    pub company_id: Option<Uuid>,
    pub employee_code: Option<String>,
    pub query: String,
}

#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    async fn notify(&self, notice: EscalationNotice) -> Result<(), NotifyError>;
}

/// SMTP notifier backed by lettre. The transport is synchronous, so the
/// send runs on the blocking pool.
pub struct SmtpNotifier {
    email: EmailConfig,
    mailbox: String,
}

impl SmtpNotifier {
    pub fn new(email: EmailConfig, mailbox: String) -> Self {
        Self { email, mailbox }
    }

    fn compose(&self, notice: &EscalationNotice) -> Result<Message, NotifyError> {
        let body = format!(
            "A support ticket needs human follow-up.\n\n\
             Ticket:   {number} ({id})\n\
             User:     {user}\n\
             Company:  {company}\n\
             Employee: {employee}\n\n\
             Message:\n{query}\n",
            number = notice.ticket_number,
            id = notice.ticket_id,
            user = notice.user_id,
            company = notice
                .company_id
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            employee = notice.employee_code.as_deref().unwrap_or("-"),
            query = notice.query,
        );

        Message::builder()
            .from(
                self.email
                    .from
                    .parse()
                    .map_err(|e| NotifyError::Address(format!("from: {e}")))?,
            )
            .to(self
                .mailbox
                .parse()
                .map_err(|e| NotifyError::Address(format!("to: {e}")))?)
            .subject(format!(
                "[{}] Unresolved support query",
                notice.ticket_number
            ))
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| NotifyError::Build(e.to_string()))
    }

    fn mailer(&self) -> Result<SmtpTransport, NotifyError> {
        if self.email.username.is_empty() {
            // Unauthenticated relay, e.g. a local test SMTP server.
            return Ok(SmtpTransport::builder_dangerous(&self.email.smtp_server)
                .port(self.email.smtp_port)
                .build());
        }
        let creds = Credentials::new(self.email.username.clone(), self.email.password.clone());
        Ok(SmtpTransport::relay(&self.email.smtp_server)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?
            .port(self.email.smtp_port)
            .credentials(creds)
            .build())
    }
}

#[async_trait]
impl EscalationNotifier for SmtpNotifier {
    async fn notify(&self, notice: EscalationNotice) -> Result<(), NotifyError> {
        let message = self.compose(&notice)?;
        let mailer = self.mailer()?;
        let ticket_number = notice.ticket_number.clone();
        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| NotifyError::Worker(e.to_string()))?
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        info!("escalation mail sent for {ticket_number}");
        Ok(())
    }
}

/// Used when no SMTP server is configured; logs and reports success so
/// local runs behave like a delivered notification.
pub struct LogNotifier;

#[async_trait]
impl EscalationNotifier for LogNotifier {
    async fn notify(&self, notice: EscalationNotice) -> Result<(), NotifyError> {
        warn!(
            "SMTP not configured; escalation for {} ({}) logged only",
            notice.ticket_number, notice.ticket_id
        );
        Ok(())
    }
}
