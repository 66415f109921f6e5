use crate::domain::SendState;
use crate::error::{QueueError, Result};

use super::mailbox::{self, Envelope};
use super::records::{OutboxRecord, OutboxViewRecord};
use super::DbPool;

pub const TABLE: &str = "outbox";

/// The not-yet-delivered mailbox. Rows carry delivery state on top of the
/// shared envelope columns and are removed on archive or flush.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: DbPool,
}

impl OutboxRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts an envelope row, then sets its priority. Two steps because
    /// priority is not part of the shared envelope columns.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if a statement fails, or
    /// `QueueError::Inconsistent` if the freshly inserted row cannot be
    /// updated.
    pub async fn add(&self, envelope: &Envelope, content_id: i64, priority: i64) -> Result<i64> {
        let id = mailbox::add(&self.pool, TABLE, envelope, content_id).await?;

        let result = sqlx::query("UPDATE outbox SET priority = ? WHERE id = ?")
            .bind(priority)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::Inconsistent(format!(
                "priority update affected no rows in outbox for id {id}"
            )));
        }

        Ok(id)
    }

    /// Duplicate detection: exact envelope + content match.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn search(&self, envelope: &Envelope, content_id: i64) -> Result<Option<i64>> {
        mailbox::search(&self.pool, TABLE, envelope, content_id).await
    }

    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn is_content_used(&self, content_id: i64) -> Result<bool> {
        mailbox::is_content_used(&self.pool, TABLE, content_id).await
    }

    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn retrieve(&self, id: i64) -> Result<Option<OutboxRecord>> {
        let record = sqlx::query_as::<_, OutboxRecord>("SELECT * FROM outbox WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// All outbox rows joined with their content, oldest action first.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn retrieve_all(&self) -> Result<Vec<OutboxViewRecord>> {
        let records = sqlx::query_as::<_, OutboxViewRecord>(
            "SELECT o.id, o.state, o.priority, o.last_action_ts,
                    o.send_from, o.reply_to, o.send_to, o.send_cc, o.send_bcc,
                    o.content_id, o.error, o.attempts,
                    c.subject, c.body, c.alt_body, c.attachments
             FROM outbox o
             JOIN content c ON o.content_id = c.id
             ORDER BY o.last_action_ts ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Selects the next row eligible for a delivery attempt: pending or
    /// failed, attempt budget left, last action at or before `now`. Ordered
    /// by ascending priority, then ascending id so rows within a priority
    /// band dequeue first-in first-out.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn get_next_pending(&self, max_attempts: i64, now: i64) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM outbox
             WHERE (state = ? OR state = ?) AND attempts < ? AND last_action_ts <= ?
             ORDER BY priority ASC, id ASC
             LIMIT 1",
        )
        .bind(SendState::Pending.as_i64())
        .bind(SendState::Failed.as_i64())
        .bind(max_attempts)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    /// Overwrites a row's state, error and attempts. The last-action
    /// timestamp is deliberately untouched; see [`touch_last_action`].
    ///
    /// [`touch_last_action`]: Self::touch_last_action
    ///
    /// # Errors
    /// Returns `QueueError::Inconsistent` if the row does not exist.
    pub async fn update_status(
        &self,
        id: i64,
        state: SendState,
        error: &str,
        attempts: i64,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE outbox SET state = ?, error = ?, attempts = ? WHERE id = ?")
            .bind(state.as_i64())
            .bind(error)
            .bind(attempts)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::Inconsistent(format!(
                "status update affected no rows in outbox for id {id}"
            )));
        }

        Ok(())
    }

    /// Promotes scheduled rows whose time has come to pending, stamping them
    /// with `now` so they become eligible for dequeue immediately. Returns
    /// the number of promoted rows.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the update fails.
    pub async fn refresh_scheduled(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE outbox SET state = ?, last_action_ts = ?
             WHERE state = ? AND last_action_ts <= ?",
        )
        .bind(SendState::Pending.as_i64())
        .bind(now)
        .bind(SendState::Scheduled.as_i64())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Purges permanently abandoned deliveries: failed rows whose last
    /// action is at or before `before`. Pending and scheduled rows are never
    /// flushed. Returns whether any row was deleted.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the delete fails.
    pub async fn flush(&self, before: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM outbox WHERE state = ? AND last_action_ts <= ?")
            .bind(SendState::Failed.as_i64())
            .bind(before)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    /// Returns `QueueError::Inconsistent` if the row does not exist.
    pub async fn remove(&self, id: i64) -> Result<()> {
        mailbox::remove(&self.pool, TABLE, id).await
    }

    /// # Errors
    /// Returns `QueueError::Database` if the update fails.
    pub async fn touch_last_action(&self, id: i64, timestamp: Option<i64>) -> Result<()> {
        mailbox::touch_last_action(&self.pool, TABLE, id, timestamp).await
    }
}
