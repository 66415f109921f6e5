//! Row records as they come out of sqlx, one struct per query shape.

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContentRecord {
    pub id: i64,
    pub subject: String,
    pub body: String,
    pub alt_body: String,
    pub attachments: String,
    pub last_action_ts: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxRecord {
    pub id: i64,
    pub state: i64,
    pub priority: i64,
    pub last_action_ts: i64,
    pub send_from: String,
    pub reply_to: String,
    pub send_to: String,
    pub send_cc: String,
    pub send_bcc: String,
    pub content_id: i64,
    pub error: String,
    pub attempts: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SentboxRecord {
    pub id: i64,
    pub last_action_ts: i64,
    pub send_from: String,
    pub reply_to: String,
    pub send_to: String,
    pub send_cc: String,
    pub send_bcc: String,
    pub content_id: i64,
}

/// Outbox row joined with its content, for operator-facing listings.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxViewRecord {
    pub id: i64,
    pub state: i64,
    pub priority: i64,
    pub last_action_ts: i64,
    pub send_from: String,
    pub reply_to: String,
    pub send_to: String,
    pub send_cc: String,
    pub send_bcc: String,
    pub content_id: i64,
    pub error: String,
    pub attempts: i64,
    pub subject: String,
    pub body: String,
    pub alt_body: String,
    pub attachments: String,
}

/// Sentbox row joined with its content, for operator-facing listings.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SentboxViewRecord {
    pub id: i64,
    pub last_action_ts: i64,
    pub send_from: String,
    pub reply_to: String,
    pub send_to: String,
    pub send_cc: String,
    pub send_bcc: String,
    pub content_id: i64,
    pub subject: String,
    pub body: String,
    pub alt_body: String,
    pub attachments: String,
}
