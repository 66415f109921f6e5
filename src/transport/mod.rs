use async_trait::async_trait;
use thiserror::Error;

use crate::domain::OutgoingMessage;

pub mod log;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The message is malformed and must not be queued or sent.
    #[error("message rejected: {0}")]
    Rejected(String),
    /// Delivery was attempted and failed; the attempt may be retried.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// The external delivery collaborator (SMTP client, HTTP API, ...).
///
/// The engine treats this as an opaque capability: a pre-flight check run
/// before a message is accepted, and a send that either delivers the whole
/// message or reports a failure with detail.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Pre-flight validation run before a message is queued or sent.
    ///
    /// # Errors
    /// Returns `TransportError::Rejected` for a malformed message.
    fn validate(&self, message: &OutgoingMessage) -> Result<(), TransportError>;

    /// Attempts delivery of the message.
    ///
    /// # Errors
    /// Returns `TransportError::Delivery` with transport-reported detail.
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError>;
}
