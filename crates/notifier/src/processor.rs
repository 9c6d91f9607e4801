//! Raw payload → event → dispatch.

use thiserror::Error;

use herald_common::types::NotificationEvent;

use crate::dispatcher::{DispatchError, Dispatcher};

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The payload is not a notification event. Reprocessing it cannot succeed.
    #[error("Malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ProcessError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProcessError::Malformed(_))
    }
}

pub struct MessageProcessor {
    dispatcher: Dispatcher,
}

impl MessageProcessor {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Decode one queue payload and deliver it to every requested channel.
    ///
    /// Events with an empty message or no channels are skipped and count as success.
    pub async fn process(&self, raw: &[u8]) -> Result<(), ProcessError> {
        let event: NotificationEvent = serde_json::from_slice(raw).map_err(|e| {
            tracing::warn!(error = %e, bytes = raw.len(), "Failed to parse message body");
            ProcessError::Malformed(e)
        })?;

        tracing::info!(
            user_id = %event.user_id,
            channels = event.channels.len(),
            "Processing notification event"
        );

        if !event.is_deliverable() {
            tracing::info!(
                user_id = %event.user_id,
                "Message has no body or no channels, skipping"
            );
            return Ok(());
        }

        match self.dispatcher.dispatch(&event).await {
            Ok(()) => {
                tracing::info!(user_id = %event.user_id, "All notifications sent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(user_id = %event.user_id, error = %e, "Notification dispatch failed");
                Err(e.into())
            }
        }
    }
}
