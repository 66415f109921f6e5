use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::services::{Mailer, ProcessOutcome};

/// Periodic single-message delivery loop: one dequeue-and-send cycle per
/// tick, which is what the single-worker queue model assumes.
#[derive(Debug)]
pub struct DeliveryWorker {
    mailer: Arc<Mailer>,
    interval_secs: u64,
}

impl DeliveryWorker {
    #[must_use]
    pub const fn new(mailer: Arc<Mailer>, interval_secs: u64) -> Self {
        Self { mailer, interval_secs }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => self.process_one().await,
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("delivery worker shutting down");
    }

    /// One processing pass. Storage errors are logged and swallowed so a
    /// transient database problem never kills the loop.
    async fn process_one(&self) {
        match self.mailer.process_next().await {
            Ok(ProcessOutcome::Sent { outbox_id, sentbox_id }) => {
                tracing::debug!(outbox_id, sentbox_id, "delivered");
            }
            Ok(ProcessOutcome::Failed { outbox_id, status }) => {
                tracing::debug!(outbox_id, attempts = status.attempts, "delivery failed, backoff recorded");
            }
            Ok(ProcessOutcome::QueueEmpty) => {
                tracing::trace!("queue empty");
            }
            Err(e) => {
                tracing::error!(error = %e, "queue processing error");
            }
        }
    }
}
