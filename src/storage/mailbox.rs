//! Operations shared by the outbox and sentbox tables.
//!
//! Both mailboxes store the same envelope columns; the outbox adds delivery
//! state on top. Rather than layering one repository on another, the shared
//! contract lives here as free functions parameterized by the table name,
//! and each repository composes them.

use crate::error::{QueueError, Result};
use crate::now_ts;

use super::DbPool;

/// The envelope half of a mailbox row, addresses already serialized to the
/// `"addr,name;..."` column format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub send_from: String,
    pub reply_to: String,
    pub send_to: String,
    pub send_cc: String,
    pub send_bcc: String,
}

/// Inserts an envelope row and returns its id.
pub(super) async fn add(
    pool: &DbPool,
    table: &'static str,
    envelope: &Envelope,
    content_id: i64,
) -> Result<i64> {
    let result = sqlx::query(&format!(
        "INSERT INTO {table} (send_from, reply_to, send_to, send_cc, send_bcc, content_id)
         VALUES (?, ?, ?, ?, ?, ?)"
    ))
    .bind(&envelope.send_from)
    .bind(&envelope.reply_to)
    .bind(&envelope.send_to)
    .bind(&envelope.send_cc)
    .bind(&envelope.send_bcc)
    .bind(content_id)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Looks up a row with exactly this envelope and content, for duplicate
/// detection. Returns `None` when no row matches.
pub(super) async fn search(
    pool: &DbPool,
    table: &'static str,
    envelope: &Envelope,
    content_id: i64,
) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT id FROM {table}
         WHERE send_from = ? AND reply_to = ? AND send_to = ?
           AND send_cc = ? AND send_bcc = ? AND content_id = ?
         LIMIT 1"
    ))
    .bind(&envelope.send_from)
    .bind(&envelope.reply_to)
    .bind(&envelope.send_to)
    .bind(&envelope.send_cc)
    .bind(&envelope.send_bcc)
    .bind(content_id)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Whether any row in this mailbox still references the content row.
pub(super) async fn is_content_used(
    pool: &DbPool,
    table: &'static str,
    content_id: i64,
) -> Result<bool> {
    let id = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT id FROM {table} WHERE content_id = ? LIMIT 1"
    ))
    .bind(content_id)
    .fetch_optional(pool)
    .await?;

    Ok(id.is_some())
}

/// Hard-deletes a row the caller has already asserted to exist.
///
/// A zero-row delete here means the storage layer lost a row under us, which
/// must surface rather than pass silently.
pub(super) async fn remove(pool: &DbPool, table: &'static str, id: i64) -> Result<()> {
    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(QueueError::Inconsistent(format!("delete affected no rows in {table} for id {id}")));
    }

    Ok(())
}

/// Updates a row's last-action timestamp.
///
/// `None` or a non-positive timestamp means "now". The write is skipped when
/// the row already holds that exact value, and a missing row is a no-op.
pub(super) async fn touch_last_action(
    pool: &DbPool,
    table: &'static str,
    id: i64,
    timestamp: Option<i64>,
) -> Result<()> {
    let timestamp = timestamp.filter(|ts| *ts > 0).unwrap_or_else(now_ts);

    let current = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT last_action_ts FROM {table} WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match current {
        None => Ok(()),
        Some(ts) if ts == timestamp => Ok(()),
        Some(_) => {
            let result = sqlx::query(&format!("UPDATE {table} SET last_action_ts = ? WHERE id = ?"))
                .bind(timestamp)
                .bind(id)
                .execute(pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(QueueError::Inconsistent(format!(
                    "last-action update affected no rows in {table} for id {id}"
                )));
            }
            Ok(())
        }
    }
}
