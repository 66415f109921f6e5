use async_trait::async_trait;

use crate::domain::OutgoingMessage;

use super::{Transport, TransportError};

/// Stand-in transport that validates addressing and "delivers" by logging.
/// Useful for development and for exercising the queue without a real
/// outbound channel.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    fn validate(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        if message.from.addr.is_empty() {
            return Err(TransportError::Rejected("missing From address".into()));
        }
        if message.to.is_empty() && message.cc.is_empty() && message.bcc.is_empty() {
            return Err(TransportError::Rejected("no recipients".into()));
        }
        Ok(())
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        tracing::info!(
            from = %message.from.addr,
            recipients = message.to.len() + message.cc.len() + message.bcc.len(),
            subject = %message.subject,
            "STUB: delivering message"
        );
        Ok(())
    }
}
