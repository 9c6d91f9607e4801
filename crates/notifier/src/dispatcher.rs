//! Multi-channel dispatch.
//!
//! Every requested channel of an event is attempted exactly once, in order,
//! regardless of earlier failures. Outcomes are folded into a single verdict.

use std::sync::Arc;

use thiserror::Error;

use herald_common::config::ChannelSenderConfig;
use herald_common::error::AppResult;
use herald_common::types::{ChannelKind, NotificationEvent};

use crate::sender::email::DEFAULT_SUBJECT;
use crate::sender::{ChannelSender, EmailSender, SendError, WhatsAppSender};

/// One channel that could not be delivered.
#[derive(Debug)]
pub struct ChannelFailure {
    pub kind: ChannelKind,
    pub contact: String,
    pub error: SendError,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{} of {} channel deliveries failed", .failures.len(), .attempted)]
    PartialFailure {
        attempted: usize,
        failures: Vec<ChannelFailure>,
    },
}

impl DispatchError {
    pub fn failures(&self) -> &[ChannelFailure] {
        match self {
            DispatchError::PartialFailure { failures, .. } => failures,
        }
    }
}

pub struct Dispatcher {
    email: Arc<dyn ChannelSender>,
    whatsapp: Arc<dyn ChannelSender>,
}

impl Dispatcher {
    pub fn new(email: Arc<dyn ChannelSender>, whatsapp: Arc<dyn ChannelSender>) -> Self {
        Self { email, whatsapp }
    }

    /// Wire the real SMTP and HTTP senders from process configuration.
    pub fn from_config(config: &ChannelSenderConfig) -> AppResult<Self> {
        Ok(Self::new(
            Arc::new(EmailSender::new(config.email.clone())),
            Arc::new(WhatsAppSender::new(config.whatsapp.clone())?),
        ))
    }

    /// Sender and subject for a channel kind. `None` for unknown kinds.
    fn route(&self, kind: &ChannelKind) -> Option<(&dyn ChannelSender, Option<&'static str>)> {
        match kind {
            ChannelKind::Email => Some((self.email.as_ref(), Some(DEFAULT_SUBJECT))),
            ChannelKind::WhatsApp => Some((self.whatsapp.as_ref(), None)),
            ChannelKind::Unknown(_) => None,
        }
    }

    pub async fn dispatch(&self, event: &NotificationEvent) -> Result<(), DispatchError> {
        let mut attempted = 0usize;
        let mut failures = Vec::new();

        for channel in &event.channels {
            let Some((sender, subject)) = self.route(&channel.kind) else {
                tracing::info!(
                    user_id = %event.user_id,
                    channel_type = %channel.kind,
                    "Unknown notification channel type, skipping"
                );
                continue;
            };

            attempted += 1;
            match sender
                .send(&channel.contact, subject, &event.notification_message)
                .await
            {
                Ok(()) => {
                    tracing::debug!(
                        user_id = %event.user_id,
                        channel_type = %channel.kind,
                        "Channel delivered"
                    );
                }
                Err(error) => {
                    let kind = sender.kind();
                    tracing::warn!(
                        user_id = %event.user_id,
                        channel_type = %kind,
                        contact = %channel.contact,
                        transient = error.is_transient(),
                        error = %error,
                        "Channel delivery failed"
                    );
                    failures.push(ChannelFailure {
                        kind,
                        contact: channel.contact.clone(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::PartialFailure {
                attempted,
                failures,
            })
        }
    }
}
