//! Mail transport adapters.
//!
//! [`SmtpTransport`] delivers through a relay. [`LogTransport`] only writes
//! the job to the log and has to be chosen explicitly (`MAIL_TRANSPORT=log`).

use crate::application::ports::{Confirmation, MailTransport, TransportError};
use crate::domain::submission::DispatchJob;
use crate::infrastructure::config::SmtpSettings;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Error returned when the SMTP transport cannot be set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpSetupError {
    /// The sender is not a valid mailbox
    InvalidSender(String),
    /// TLS parameters for the relay could not be built
    Tls(String),
}

impl fmt::Display for SmtpSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtpSetupError::InvalidSender(reason) => write!(f, "invalid EMAIL_FROM: {reason}"),
            SmtpSetupError::Tls(reason) => write!(f, "smtp tls setup failed: {reason}"),
        }
    }
}

impl std::error::Error for SmtpSetupError {}

/// Transport delivering notifications through an SMTP relay.
///
/// Connection failures, timeouts and 4xx replies are transient; 5xx replies
/// (rejected credentials, unknown mailbox) and malformed messages are
/// permanent.
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    relay: String,
}

impl fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("relay", &self.relay)
            .field("from", &self.from.to_string())
            .finish()
    }
}

impl SmtpTransport {
    /// Build a transport for `settings`. Each connection attempt gives up after `timeout`.
    ///
    /// # Errors
    /// Returns `SmtpSetupError` if the sender does not parse or TLS cannot be configured.
    pub fn new(settings: &SmtpSettings, timeout: Duration) -> Result<Self, SmtpSetupError> {
        let from = settings
            .from
            .parse::<Mailbox>()
            .map_err(|e| SmtpSetupError::InvalidSender(e.to_string()))?;

        let builder = if settings.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|e| SmtpSetupError::Tls(e.to_string()))?
        } else {
            let tls = TlsParameters::new(settings.host.clone())
                .map_err(|e| SmtpSetupError::Tls(e.to_string()))?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.host.as_str())
                .tls(Tls::Opportunistic(tls))
        };

        let mut builder = builder.port(settings.port).timeout(Some(timeout));
        if let (Some(user), Some(pass)) = (&settings.user, &settings.pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        info!(
            relay = %settings.host,
            port = settings.port,
            secure = settings.secure,
            "smtp transport ready"
        );
        Ok(Self {
            mailer: builder.build(),
            from,
            relay: settings.host.clone(),
        })
    }

    fn message(&self, job: &DispatchJob) -> Result<Message, TransportError> {
        let to = job
            .recipient
            .parse::<Mailbox>()
            .map_err(|e| TransportError::Permanent(format!("invalid recipient: {e}")))?;
        let reply_to = job
            .reply_to
            .parse::<Mailbox>()
            .map_err(|e| TransportError::Permanent(format!("invalid reply-to: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .reply_to(reply_to)
            .to(to)
            .subject(job.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(job.body.clone())
            .map_err(|e| TransportError::Permanent(format!("message not built: {e}")))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, job: &DispatchJob) -> Result<Confirmation, TransportError> {
        let message = self.message(job)?;
        match self.mailer.send(message).await {
            Ok(response) => {
                let reply = response.first_line().unwrap_or_default().to_string();
                debug!(relay = %self.relay, %reply, "relay accepted message");
                Ok(Confirmation(reply))
            }
            Err(e) if e.is_permanent() || e.is_client() => {
                Err(TransportError::Permanent(e.to_string()))
            }
            Err(e) => Err(TransportError::Transient(e.to_string())),
        }
    }
}

/// Transport that writes each notification to the log instead of sending it.
///
/// For development only. Every attempt succeeds with a fresh confirmation id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

impl LogTransport {
    /// Create a log transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, job: &DispatchJob) -> Result<Confirmation, TransportError> {
        if job.recipient.is_empty() {
            return Err(TransportError::Permanent("no recipient configured".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        info!(
            confirmation = %id,
            to = %job.recipient,
            reply_to = %job.reply_to,
            subject = %job.subject,
            body_len = job.body.len(),
            "notification written to log"
        );
        Ok(Confirmation(id))
    }
}
