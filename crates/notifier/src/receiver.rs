//! Receive loop: the poll / process / settle cycle against the queue.
//!
//! Each iteration goes `Polling → (MessageReceived | Timeout | TransientError)`
//! and, for a received message, `Processing → (Acknowledged | Abandoned |
//! DeadLettered)`. A failed receive waits for the backoff delay and polls again,
//! forever. A message that has started processing is always run to completion
//! before shutdown is honoured. A pending receive or backoff wait is not.

use std::future::Future;
use std::time::Duration;

use herald_common::config::FailurePolicy;
use herald_common::error::AppResult;

use crate::processor::{MessageProcessor, ProcessError};
use crate::queue::{MessageQueue, RawMessage};

const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Delay strategy applied after a failed receive.
pub trait Backoff: Send + Sync {
    /// `consecutive_failures` starts at 1 for the first failure in a row.
    fn delay(&self, consecutive_failures: u32) -> Duration;
}

/// Same delay after every failure.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl Backoff for FixedBackoff {
    fn delay(&self, _consecutive_failures: u32) -> Duration {
        self.0
    }
}

/// Where one iteration of the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing arrived within the receive window.
    Timeout,
    /// The receive call failed; the backoff delay has already elapsed.
    TransientError,
    Acknowledged,
    Abandoned,
    DeadLettered,
}

pub struct ReceiveLoop<Q> {
    queue: Q,
    processor: MessageProcessor,
    receive_timeout: Duration,
    backoff: Box<dyn Backoff>,
    failure_policy: FailurePolicy,
    consecutive_errors: u32,
}

impl<Q: MessageQueue> ReceiveLoop<Q> {
    pub fn new(queue: Q, processor: MessageProcessor) -> Self {
        Self {
            queue,
            processor,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            backoff: Box::new(FixedBackoff(DEFAULT_BACKOFF)),
            failure_policy: FailurePolicy::default(),
            consecutive_errors: 0,
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Run until the process is terminated.
    pub async fn run(&mut self) {
        self.run_until(std::future::pending()).await;
    }

    /// Run until `shutdown` resolves. Shutdown interrupts a pending receive or
    /// backoff wait, never a message that is being processed.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            receive_timeout_secs = self.receive_timeout.as_secs(),
            failure_policy = ?self.failure_policy,
            "Receive loop started"
        );

        tokio::pin!(shutdown);
        loop {
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Receive loop stopping");
                    return;
                }
                received = self.queue.receive_one(self.receive_timeout) => received,
            };

            if self.handle(received).await == Step::TransientError {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        tracing::info!("Receive loop stopping");
                        return;
                    }
                    _ = tokio::time::sleep(self.current_backoff()) => {}
                }
            }
        }
    }

    /// Execute exactly one iteration, including the backoff wait after a failed
    /// receive.
    pub async fn step(&mut self) -> Step {
        let received = self.queue.receive_one(self.receive_timeout).await;
        let step = self.handle(received).await;
        if step == Step::TransientError {
            tokio::time::sleep(self.current_backoff()).await;
        }
        step
    }

    fn current_backoff(&self) -> Duration {
        self.backoff.delay(self.consecutive_errors)
    }

    async fn handle(&mut self, received: AppResult<Option<RawMessage>>) -> Step {
        let message = match received {
            Ok(Some(message)) => message,
            Ok(None) => {
                self.consecutive_errors = 0;
                return Step::Timeout;
            }
            Err(e) => {
                self.consecutive_errors = self.consecutive_errors.saturating_add(1);
                tracing::warn!(
                    error = %e,
                    consecutive_errors = self.consecutive_errors,
                    retry_in_ms = self.current_backoff().as_millis() as u64,
                    "Error receiving message, retrying"
                );
                return Step::TransientError;
            }
        };
        self.consecutive_errors = 0;

        tracing::info!(
            message_id = %message.id,
            bytes = message.body.len(),
            "Received message"
        );

        let result = self.processor.process(&message.body).await;
        self.settle(&message, result).await
    }

    async fn settle(&mut self, message: &RawMessage, result: Result<(), ProcessError>) -> Step {
        let step = match &result {
            Ok(()) => Step::Acknowledged,
            Err(ProcessError::Malformed(_)) => Step::DeadLettered,
            // Permanent failures are never redelivered.
            Err(ProcessError::Dispatch(e)) => match self.failure_policy {
                FailurePolicy::Abandon if e.failures().iter().any(|f| f.error.is_transient()) => {
                    Step::Abandoned
                }
                FailurePolicy::Abandon | FailurePolicy::Complete => Step::Acknowledged,
            },
        };

        if let Err(e) = &result {
            tracing::error!(
                message_id = %message.id,
                error = %e,
                settlement = ?step,
                "Message processing failed"
            );
        }

        let settled = match step {
            Step::Acknowledged => self.queue.acknowledge(message).await,
            Step::Abandoned => self.queue.abandon(message).await,
            Step::DeadLettered => self.queue.dead_letter(message).await,
            Step::Timeout | Step::TransientError => Ok(()),
        };

        let elapsed_ms = (chrono::Utc::now() - message.received_at).num_milliseconds();
        match settled {
            Ok(()) => tracing::info!(
                message_id = %message.id,
                settlement = ?step,
                elapsed_ms,
                "Message settled"
            ),
            Err(e) => tracing::error!(
                message_id = %message.id,
                settlement = ?step,
                error = %e,
                "Failed to settle message"
            ),
        }

        step
    }
}
