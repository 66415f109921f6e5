use crate::error::Result;

use super::mailbox::{self, Envelope};
use super::records::{SentboxRecord, SentboxViewRecord};
use super::DbPool;

pub const TABLE: &str = "sentbox";

/// The archive of successfully delivered mail. Envelope only, no delivery
/// state; rows are written on archive and removed by the TTL flush.
#[derive(Debug, Clone)]
pub struct SentboxRepository {
    pool: DbPool,
}

impl SentboxRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// # Errors
    /// Returns `QueueError::Database` if the insert fails.
    pub async fn add(&self, envelope: &Envelope, content_id: i64) -> Result<i64> {
        mailbox::add(&self.pool, TABLE, envelope, content_id).await
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
    pub async fn retrieve(&self, id: i64) -> Result<Option<SentboxRecord>> {
        let record = sqlx::query_as::<_, SentboxRecord>("SELECT * FROM sentbox WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// All sentbox rows joined with their content, oldest action first.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn retrieve_all(&self) -> Result<Vec<SentboxViewRecord>> {
        let records = sqlx::query_as::<_, SentboxViewRecord>(
            "SELECT s.id, s.last_action_ts,
                    s.send_from, s.reply_to, s.send_to, s.send_cc, s.send_bcc, s.content_id,
                    c.subject, c.body, c.alt_body, c.attachments
             FROM sentbox s
             JOIN content c ON s.content_id = c.id
             ORDER BY s.last_action_ts ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Deletes archived rows whose last action is at or before `before`.
    /// Returns whether any row was deleted.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the delete fails.
    pub async fn flush(&self, before: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sentbox WHERE last_action_ts <= ?")
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
