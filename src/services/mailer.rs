use std::sync::Arc;
use std::time::Duration;

use crate::config::{DeliveryConfig, QueueConfig};
use crate::domain::{OutgoingMessage, SendState, SendingStatus, priority};
use crate::error::{QueueError, Result};
use crate::now_ts;
use crate::transport::{Transport, TransportError};

use super::queue::{DequeuedMessage, QueueHandler};

/// Linear backoff step: each failed attempt pushes the next try out by
/// another 15 minutes.
const BACKOFF_STEP_SECS: i64 = 900;

/// Result of one queue-processing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The next queued message was delivered and archived.
    Sent { outbox_id: i64, sentbox_id: i64 },
    /// The next queued message failed; its status (error text, attempts,
    /// backoff timestamp) has been written back to the outbox.
    Failed { outbox_id: i64, status: SendingStatus },
    /// Nothing is eligible for delivery right now.
    QueueEmpty,
}

/// Result of a direct, synchronous send.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub sent: bool,
    pub sentbox_id: Option<i64>,
    pub status: SendingStatus,
}

/// Drives the message lifecycle: builds messages from defaults plus caller
/// overrides, validates them against the transport, and runs the
/// send-then-record cycle for both direct and queued delivery.
#[derive(Debug)]
pub struct Mailer {
    queue: Arc<QueueHandler>,
    transport: Arc<dyn Transport>,
    defaults: OutgoingMessage,
    max_sending_attempts: i64,
    send_timeout: Duration,
}

impl Mailer {
    #[must_use]
    pub fn new(
        queue: Arc<QueueHandler>,
        transport: Arc<dyn Transport>,
        defaults: OutgoingMessage,
        queue_config: &QueueConfig,
        delivery_config: &DeliveryConfig,
    ) -> Self {
        Self {
            queue,
            transport,
            defaults,
            max_sending_attempts: queue_config.max_sending_attempts(),
            send_timeout: Duration::from_secs(delivery_config.send_timeout_secs),
        }
    }

    #[must_use]
    pub fn queue_handler(&self) -> &QueueHandler {
        &self.queue
    }

    /// Queues a message for later delivery without sending it.
    ///
    /// `scheduled_ts` defers eligibility until that unix timestamp; `None`
    /// (or zero) queues for immediate delivery. The message is validated by
    /// the transport first and is discarded, never persisted, when that
    /// pre-flight check fails.
    ///
    /// # Errors
    /// Returns `QueueError::Validation` if the transport rejects the
    /// message, or a storage error if persisting fails.
    #[tracing::instrument(skip(self, message), err(level = "warn"))]
    pub async fn queue_message(
        &self,
        mut message: OutgoingMessage,
        priority: i64,
        scheduled_ts: Option<i64>,
    ) -> Result<i64> {
        message.apply_defaults(&self.defaults);

        let mut status = SendingStatus { priority, ..Default::default() };
        if let Some(ts) = scheduled_ts.filter(|ts| *ts != 0) {
            status.state = SendState::Scheduled;
            status.last_action_ts = ts;
        }

        self.transport
            .validate(&message)
            .map_err(|e| QueueError::Validation(e.to_string()))?;

        let outbox_id = self.queue.enqueue(&message, &status).await?;
        tracing::info!(outbox_id, priority, scheduled = scheduled_ts.is_some(), "message queued");
        Ok(outbox_id)
    }

    /// Sends a message immediately, bypassing the queue, at system priority.
    ///
    /// No retry is scheduled on failure since the caller observes the
    /// outcome directly. With `archive` set, a delivered message is recorded
    /// in the sentbox.
    ///
    /// # Errors
    /// Returns `QueueError::Validation` if the transport rejects the
    /// message, or a storage error if archiving fails.
    #[tracing::instrument(skip(self, message), err(level = "warn"))]
    pub async fn send_message(&self, mut message: OutgoingMessage, archive: bool) -> Result<SendReport> {
        message.apply_defaults(&self.defaults);

        self.transport
            .validate(&message)
            .map_err(|e| QueueError::Validation(e.to_string()))?;

        let mut status =
            SendingStatus { priority: priority::SYSTEM, ..Default::default() };
        let sent = self.attempt(&message, &mut status, None).await?;

        let sentbox_id = if sent && archive {
            let id = self.queue.archive(&message, None).await?;
            status.queue_id = Some(id);
            Some(id)
        } else {
            None
        };

        Ok(SendReport { sent, sentbox_id, status })
    }

    /// Processes the next queued message, if any: dequeue, attempt delivery,
    /// then archive on success or record the failure with backoff.
    ///
    /// A delivery failure is reported in the outcome, not as an error, so a
    /// periodic driver never crashes over a single bad message.
    ///
    /// # Errors
    /// Returns a storage error if the queue itself cannot be read or
    /// written.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn process_next(&self) -> Result<ProcessOutcome> {
        let Some(dequeued) = self.queue.dequeue(self.max_sending_attempts).await? else {
            return Ok(ProcessOutcome::QueueEmpty);
        };

        let DequeuedMessage { outbox_id, content_id, message, mut status } = dequeued;
        status.queue_id = Some(outbox_id);

        let sent = self.attempt(&message, &mut status, Some((outbox_id, content_id))).await?;

        if sent {
            let sentbox_id = self.queue.archive(&message, Some(outbox_id)).await?;
            tracing::info!(outbox_id, sentbox_id, "queued message delivered");
            Ok(ProcessOutcome::Sent { outbox_id, sentbox_id })
        } else {
            tracing::warn!(
                outbox_id,
                attempts = status.attempts,
                error = %status.error,
                "queued message delivery failed"
            );
            Ok(ProcessOutcome::Failed { outbox_id, status })
        }
    }

    /// One delivery attempt. For queued messages (`queued` holds the outbox
    /// and content ids) the resulting status is written back, including the
    /// linear backoff timestamp while attempts remain under the cap.
    async fn attempt(
        &self,
        message: &OutgoingMessage,
        status: &mut SendingStatus,
        queued: Option<(i64, i64)>,
    ) -> Result<bool> {
        status.last_action_ts = now_ts();

        let outcome = match tokio::time::timeout(self.send_timeout, self.transport.send(message)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Delivery(format!(
                "delivery timed out after {}s",
                self.send_timeout.as_secs()
            ))),
        };

        let sent = match outcome {
            Ok(()) => {
                status.state = SendState::Succeeded;
                status.error.clear();
                status.last_action_ts = now_ts();
                true
            }
            Err(e) => {
                status.error = e.to_string();
                if queued.is_some() {
                    status.state = SendState::Failed;
                    status.attempts += 1;
                    if status.attempts < self.max_sending_attempts {
                        status.last_action_ts = now_ts() + status.attempts * BACKOFF_STEP_SECS;
                    }
                }
                false
            }
        };

        if let Some((outbox_id, content_id)) = queued {
            self.queue.update_sending_status(status, outbox_id, Some(content_id)).await?;
        }

        Ok(sent)
    }
}
