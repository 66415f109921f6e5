use crate::error::Result;
use crate::now_ts;

use super::records::ContentRecord;
use super::{DbPool, mailbox, outbox_repo, sentbox_repo};

pub const TABLE: &str = "content";

/// Deduplicated storage of message payloads. A row is immutable once written
/// except for its last-action timestamp, and may be shared by any number of
/// outbox and sentbox rows.
#[derive(Debug, Clone)]
pub struct ContentRepository {
    pool: DbPool,
}

impl ContentRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Exact-match lookup across all four content fields. Returns the id of
    /// the matching row, or `None`.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn search(
        &self,
        subject: &str,
        body: &str,
        alt_body: &str,
        attachments: &str,
    ) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM content
             WHERE subject = ? AND body = ? AND alt_body = ? AND attachments = ?
             LIMIT 1",
        )
        .bind(subject)
        .bind(body)
        .bind(alt_body)
        .bind(attachments)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    /// Unconditional insert. Callers are expected to have called [`search`]
    /// first; the store itself does not enforce uniqueness.
    ///
    /// [`search`]: Self::search
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the insert fails.
    pub async fn add(
        &self,
        subject: &str,
        body: &str,
        alt_body: &str,
        attachments: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO content (subject, body, alt_body, attachments, last_action_ts)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(subject)
        .bind(body)
        .bind(alt_body)
        .bind(attachments)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// # Errors
    /// Returns `QueueError::Database` if the query fails.
    pub async fn retrieve(&self, id: i64) -> Result<Option<ContentRecord>> {
        let record = sqlx::query_as::<_, ContentRecord>("SELECT * FROM content WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Updates the last-action timestamp; `None` means now. Idempotent.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if the update fails.
    pub async fn touch(&self, id: i64, timestamp: Option<i64>) -> Result<()> {
        mailbox::touch_last_action(&self.pool, TABLE, id, timestamp).await
    }

    /// Deletes rows whose last action is at or before `before`, unless some
    /// outbox or sentbox row still references them. Returns whether any row
    /// was deleted.
    ///
    /// The reference check is a per-row scan; an explicit counter column
    /// would be a valid optimization with the same observable behavior.
    ///
    /// # Errors
    /// Returns `QueueError::Database` if a query fails.
    pub async fn flush(&self, before: i64) -> Result<bool> {
        let stale_ids =
            sqlx::query_scalar::<_, i64>("SELECT id FROM content WHERE last_action_ts <= ?")
                .bind(before)
                .fetch_all(&self.pool)
                .await?;

        let mut deleted = false;
        for id in stale_ids {
            if mailbox::is_content_used(&self.pool, outbox_repo::TABLE, id).await?
                || mailbox::is_content_used(&self.pool, sentbox_repo::TABLE, id).await?
            {
                continue;
            }

            sqlx::query("DELETE FROM content WHERE id = ?").bind(id).execute(&self.pool).await?;
            deleted = true;
        }

        Ok(deleted)
    }
}
