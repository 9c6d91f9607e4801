//! Queue-driven notification worker.
//!
//! Consumes notification events from a queue and fans each one out to the
//! requested delivery channels:
//! - Email over an SMTP relay
//! - WhatsApp over an HTTP messaging gateway

pub mod dispatcher;
pub mod processor;
pub mod queue;
pub mod receiver;
pub mod sender;
