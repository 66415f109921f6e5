use serde::Serialize;

use crate::config::QueueConfig;
use crate::domain::{OutgoingMessage, SendState, SendingStatus, address, message};
use crate::error::{QueueError, Result};
use crate::now_ts;
use crate::storage::content_repo::ContentRepository;
use crate::storage::mailbox::Envelope;
use crate::storage::outbox_repo::OutboxRepository;
use crate::storage::records::{OutboxRecord, OutboxViewRecord, SentboxViewRecord};
use crate::storage::sentbox_repo::SentboxRepository;
use crate::storage::system_repo::SystemRepository;
use crate::storage::DbPool;

/// A message pulled off the queue for a delivery attempt.
#[derive(Debug, Clone)]
pub struct DequeuedMessage {
    pub outbox_id: i64,
    pub content_id: i64,
    pub message: OutgoingMessage,
    pub status: SendingStatus,
}

/// Operator-facing view of a queued message.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub content_id: i64,
    pub message: OutgoingMessage,
    pub status: SendingStatus,
}

/// Operator-facing view of an archived message.
#[derive(Debug, Clone, Serialize)]
pub struct SentboxEntry {
    pub id: i64,
    pub content_id: i64,
    pub message: OutgoingMessage,
    pub last_action_ts: i64,
}

/// Orchestrates the three stores behind the queue: content dedup on the way
/// in, eligibility selection on the way out, archival on success, and the
/// registry-throttled maintenance sweeps.
#[derive(Debug)]
pub struct QueueHandler {
    content: ContentRepository,
    outbox: OutboxRepository,
    sentbox: SentboxRepository,
    system: SystemRepository,
    sent_ttl_secs: i64,
    refresh_interval_secs: i64,
    flush_interval_secs: i64,
}

impl QueueHandler {
    #[must_use]
    pub fn new(pool: DbPool, config: &QueueConfig) -> Self {
        Self {
            content: ContentRepository::new(pool.clone()),
            outbox: OutboxRepository::new(pool.clone()),
            sentbox: SentboxRepository::new(pool.clone()),
            system: SystemRepository::new(pool),
            sent_ttl_secs: config.sent_ttl_secs(),
            refresh_interval_secs: config.refresh_interval_secs,
            flush_interval_secs: config.flush_interval_secs,
        }
    }

    #[must_use]
    pub const fn content(&self) -> &ContentRepository {
        &self.content
    }

    #[must_use]
    pub const fn outbox(&self) -> &OutboxRepository {
        &self.outbox
    }

    #[must_use]
    pub const fn sentbox(&self) -> &SentboxRepository {
        &self.sentbox
    }

    #[must_use]
    pub const fn system(&self) -> &SystemRepository {
        &self.system
    }

    /// Stores the message in the outbox: content is deduplicated, the
    /// envelope row is inserted with the status's priority, and the status
    /// fields (state, error, attempts, last action) are written through.
    /// Returns the new outbox id.
    ///
    /// # Errors
    /// Returns `QueueError::Database` or `QueueError::Inconsistent` if a
    /// store operation fails.
    #[tracing::instrument(skip(self, message, status), err(level = "warn"))]
    pub async fn enqueue(&self, message: &OutgoingMessage, status: &SendingStatus) -> Result<i64> {
        let content_id = self.process_content(message).await?;
        let envelope = envelope_of(message);

        let outbox_id = self.outbox.add(&envelope, content_id, status.priority).await?;
        self.update_sending_status(status, outbox_id, Some(content_id)).await?;

        tracing::debug!(outbox_id, content_id, "message enqueued");
        Ok(outbox_id)
    }

    /// Pulls the next eligible message off the queue.
    ///
    /// Scheduled rows whose time has passed are promoted first (at most once
    /// per refresh interval, throttled through the registry). When the queue
    /// is empty the TTL flush runs instead, likewise throttled, and `None`
    /// is returned.
    ///
    /// A selected row whose content has gone missing is a terminal failure:
    /// the row is marked failed with its attempts raised to the cap so it is
    /// never selected again.
    ///
    /// # Errors
    /// Returns `QueueError::Database` or `QueueError::Inconsistent` if a
    /// store operation fails.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn dequeue(&self, max_attempts: i64) -> Result<Option<DequeuedMessage>> {
        let now = now_ts();

        if now - self.system.last_refresh().await? >= self.refresh_interval_secs {
            let promoted = self.outbox.refresh_scheduled(now).await?;
            if promoted > 0 {
                tracing::debug!(promoted, "promoted scheduled mail to pending");
            }
            self.system.set_last_refresh(now).await?;
        }

        if let Some(outbox_id) = self.outbox.get_next_pending(max_attempts, now).await? {
            let record = self.outbox.retrieve(outbox_id).await?.ok_or_else(|| {
                QueueError::Inconsistent(format!("outbox row {outbox_id} vanished after selection"))
            })?;

            if let Some(content) = self.content.retrieve(record.content_id).await? {
                let message = OutgoingMessage {
                    from: first_address(&record.send_from),
                    reply_to: address::parse_addresses(&record.reply_to),
                    to: address::parse_addresses(&record.send_to),
                    cc: address::parse_addresses(&record.send_cc),
                    bcc: address::parse_addresses(&record.send_bcc),
                    subject: content.subject,
                    body: content.body,
                    alt_body: content.alt_body,
                    attachments: message::parse_attachments(&content.attachments),
                };

                return Ok(Some(DequeuedMessage {
                    outbox_id,
                    content_id: record.content_id,
                    message,
                    status: status_of(&record)?,
                }));
            }

            // Nothing to retry: without content the message cannot be rebuilt.
            let status = SendingStatus {
                queue_id: Some(outbox_id),
                state: SendState::Failed,
                priority: record.priority,
                error: format!("content (id={}) not found", record.content_id),
                last_action_ts: now,
                attempts: max_attempts,
            };
            tracing::error!(outbox_id, content_id = record.content_id, "queued message lost its content");
            self.update_sending_status(&status, outbox_id, Some(record.content_id)).await?;
        }

        self.flush_if_due(now).await?;
        Ok(None)
    }

    /// Records a delivered message in the sentbox (content re-deduplicated,
    /// since it may have changed in flight), freshens the content timestamp,
    /// and removes the outbox row when the message came from the queue.
    /// Returns the new sentbox id.
    ///
    /// # Errors
    /// Returns `QueueError::Database` or `QueueError::Inconsistent` if a
    /// store operation fails.
    #[tracing::instrument(skip(self, message), err(level = "warn"))]
    pub async fn archive(&self, message: &OutgoingMessage, outbox_id: Option<i64>) -> Result<i64> {
        let content_id = self.process_content(message).await?;
        let envelope = envelope_of(message);

        let sentbox_id = self.sentbox.add(&envelope, content_id).await?;
        self.sentbox.touch_last_action(sentbox_id, None).await?;
        self.content.touch(content_id, None).await?;

        if let Some(outbox_id) = outbox_id {
            self.outbox.remove(outbox_id).await?;
        }

        tracing::debug!(sentbox_id, content_id, "message archived");
        Ok(sentbox_id)
    }

    /// Writes a sending status back to its outbox row and propagates the
    /// last-action timestamp to both the row and its content.
    ///
    /// # Errors
    /// Returns `QueueError::NotFound` if the outbox row is gone and no
    /// content id was supplied, `QueueError::Database` or
    /// `QueueError::Inconsistent` if a store operation fails.
    pub async fn update_sending_status(
        &self,
        status: &SendingStatus,
        outbox_id: i64,
        content_id: Option<i64>,
    ) -> Result<()> {
        let content_id = match content_id {
            Some(id) => id,
            None => {
                self.outbox.retrieve(outbox_id).await?.ok_or(QueueError::NotFound)?.content_id
            }
        };

        self.outbox.update_status(outbox_id, status.state, &status.error, status.attempts).await?;
        self.outbox.touch_last_action(outbox_id, Some(status.last_action_ts)).await?;
        self.content.touch(content_id, Some(status.last_action_ts)).await?;

        Ok(())
    }

    /// Whether a byte-identical message (same envelope, same content) is
    /// already queued or archived.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if a query fails.
    pub async fn is_duplicate(&self, message: &OutgoingMessage) -> Result<bool> {
        let attachments = message::format_attachments(&message.attachments);
        let Some(content_id) = self
            .content
            .search(&message.subject, &message.body, &message.alt_body, &attachments)
            .await?
        else {
            return Ok(false);
        };

        let envelope = envelope_of(message);
        Ok(self.outbox.search(&envelope, content_id).await?.is_some()
            || self.sentbox.search(&envelope, content_id).await?.is_some())
    }

    /// All queued messages with their content, oldest action first.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn fetch_outbox(&self) -> Result<Vec<OutboxEntry>> {
        let records = self.outbox.retrieve_all().await?;
        records.into_iter().map(outbox_entry_of).collect()
    }

    /// All archived messages with their content, oldest action first.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn fetch_sentbox(&self) -> Result<Vec<SentboxEntry>> {
        let records = self.sentbox.retrieve_all().await?;
        Ok(records.into_iter().map(sentbox_entry_of).collect())
    }

    /// Runs the TTL flush unconditionally against the given cutoff: archived
    /// mail, abandoned failed mail, then orphaned stale content. Returns
    /// whether anything was deleted.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if a store operation fails.
    pub async fn flush_now(&self, before: i64) -> Result<bool> {
        if before <= 0 {
            return Ok(false);
        }

        let flushed_sent = self.sentbox.flush(before).await?;
        let flushed_failed = self.outbox.flush(before).await?;
        let flushed_content = self.content.flush(before).await?;

        Ok(flushed_sent || flushed_failed || flushed_content)
    }

    async fn flush_if_due(&self, now: i64) -> Result<bool> {
        if self.sent_ttl_secs <= 0 {
            return Ok(false);
        }
        if now - self.system.last_flush().await? < self.flush_interval_secs {
            return Ok(false);
        }

        let flushed = self.flush_now(now - self.sent_ttl_secs).await?;
        self.system.set_last_flush(now).await?;

        if flushed {
            tracing::debug!(cutoff = now - self.sent_ttl_secs, "flushed stale mail");
        }
        Ok(flushed)
    }

    /// Resolves the message's content to a row id: reuse the byte-identical
    /// row when one exists, insert otherwise. This is what guarantees at
    /// most one content row per unique payload.
    async fn process_content(&self, message: &OutgoingMessage) -> Result<i64> {
        let attachments = message::format_attachments(&message.attachments);

        let existing = self
            .content
            .search(&message.subject, &message.body, &message.alt_body, &attachments)
            .await?;

        match existing {
            Some(id) => Ok(id),
            None => {
                self.content
                    .add(&message.subject, &message.body, &message.alt_body, &attachments)
                    .await
            }
        }
    }
}

fn envelope_of(message: &OutgoingMessage) -> Envelope {
    Envelope {
        send_from: address::format_addresses(std::slice::from_ref(&message.from)),
        reply_to: address::format_addresses(&message.reply_to),
        send_to: address::format_addresses(&message.to),
        send_cc: address::format_addresses(&message.cc),
        send_bcc: address::format_addresses(&message.bcc),
    }
}

fn first_address(line: &str) -> crate::domain::Address {
    address::parse_addresses(line).into_iter().next().unwrap_or_default()
}

fn status_of(record: &OutboxRecord) -> Result<SendingStatus> {
    let state = SendState::try_from(record.state).map_err(|value| {
        QueueError::Inconsistent(format!("outbox row {} holds unknown state {value}", record.id))
    })?;

    Ok(SendingStatus {
        queue_id: Some(record.id),
        state,
        priority: record.priority,
        error: record.error.clone(),
        last_action_ts: record.last_action_ts,
        attempts: record.attempts,
    })
}

fn outbox_entry_of(record: OutboxViewRecord) -> Result<OutboxEntry> {
    let state = SendState::try_from(record.state).map_err(|value| {
        QueueError::Inconsistent(format!("outbox row {} holds unknown state {value}", record.id))
    })?;

    Ok(OutboxEntry {
        id: record.id,
        content_id: record.content_id,
        message: OutgoingMessage {
            from: first_address(&record.send_from),
            reply_to: address::parse_addresses(&record.reply_to),
            to: address::parse_addresses(&record.send_to),
            cc: address::parse_addresses(&record.send_cc),
            bcc: address::parse_addresses(&record.send_bcc),
            subject: record.subject,
            body: record.body,
            alt_body: record.alt_body,
            attachments: message::parse_attachments(&record.attachments),
        },
        status: SendingStatus {
            queue_id: Some(record.id),
            state,
            priority: record.priority,
            error: record.error,
            last_action_ts: record.last_action_ts,
            attempts: record.attempts,
        },
    })
}

fn sentbox_entry_of(record: SentboxViewRecord) -> SentboxEntry {
    SentboxEntry {
        id: record.id,
        content_id: record.content_id,
        message: OutgoingMessage {
            from: first_address(&record.send_from),
            reply_to: address::parse_addresses(&record.reply_to),
            to: address::parse_addresses(&record.send_to),
            cc: address::parse_addresses(&record.send_cc),
            bcc: address::parse_addresses(&record.send_bcc),
            subject: record.subject,
            body: record.body,
            alt_body: record.alt_body,
            attachments: message::parse_attachments(&record.attachments),
        },
        last_action_ts: record.last_action_ts,
    }
}
