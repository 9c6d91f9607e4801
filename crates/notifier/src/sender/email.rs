//! SMTP email sender.
//!
//! Builds a minimal plain-text message and submits it over an authenticated
//! session to the configured relay. PLAIN and LOGIN are both supported; which
//! one is offered is a per-relay setting in [`EmailConfig`].

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use herald_common::config::{EmailConfig, SmtpAuth, SmtpTls};
use herald_common::types::ChannelKind;

use super::{ChannelSender, SendError};

/// Subject of every notification email, and the fallback when the caller does
/// not supply one.
pub const DEFAULT_SUBJECT: &str = "Notification";

pub struct EmailSender {
    config: EmailConfig,
}

impl EmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Build the outbound message. Fails if either mailbox cannot be parsed.
    pub fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, SendError> {
        let from: Mailbox = self.config.sender.parse().map_err(|e| {
            SendError::InvalidArgument(format!("sender address '{}': {e}", self.config.sender))
        })?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| SendError::InvalidArgument(format!("recipient address '{to}': {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| SendError::InvalidArgument(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, SendError> {
        let host = self.config.host.as_str();
        let builder = match self.config.tls {
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| SendError::TransportFailure(format!("SMTP relay setup: {e}")))?,
            SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| SendError::TransportFailure(format!("SMTP relay setup: {e}")))?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };

        let mechanism = match self.config.auth {
            SmtpAuth::Plain => Mechanism::Plain,
            SmtpAuth::Login => Mechanism::Login,
        };

        let mut builder = builder
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.secret.clone(),
            ))
            .authentication(vec![mechanism])
            .timeout(Some(Duration::from_secs(self.config.timeout_secs)));
        if let Some(port) = self.config.port {
            builder = builder.port(port);
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(
        &self,
        contact: &str,
        subject: Option<&str>,
        body: &str,
    ) -> Result<(), SendError> {
        if !self.config.is_configured() {
            return Err(SendError::NotConfigured(
                "SMTP host, port, username, password and sender must all be set".to_string(),
            ));
        }
        if contact.is_empty() || body.is_empty() {
            return Err(SendError::InvalidArgument(
                "email recipient and body must not be empty".to_string(),
            ));
        }

        let message = self.build_message(contact, subject.unwrap_or(DEFAULT_SUBJECT), body)?;
        let transport = self.transport()?;

        transport
            .send(message)
            .await
            .map_err(|e| SendError::TransportFailure(format!("SMTP send failed: {e}")))?;

        tracing::info!(to = %contact, "Email sent");
        Ok(())
    }
}
