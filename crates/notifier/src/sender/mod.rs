//! Channel senders. One per delivery channel, each wrapping a transport call.

pub mod email;
pub mod whatsapp;

use async_trait::async_trait;
use thiserror::Error;

use herald_common::types::ChannelKind;

pub use email::EmailSender;
pub use whatsapp::WhatsAppSender;

/// Why a single channel send did not go through.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Auth failure: {0}")]
    AuthFailure(String),
}

impl SendError {
    /// Whether retrying the same send could succeed without a config or input change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SendError::TransportFailure(_) | SendError::AuthFailure(_)
        )
    }
}

/// Capability shared by every delivery channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, contact: &str, subject: Option<&str>, body: &str)
    -> Result<(), SendError>;
}
