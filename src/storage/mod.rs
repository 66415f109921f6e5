use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

pub mod content_repo;
pub mod mailbox;
pub mod outbox_repo;
pub mod records;
pub mod sentbox_repo;
pub mod system_repo;

pub type DbPool = Pool<Sqlite>;

/// Initializes the database connection pool, creating the database file if
/// it does not exist yet.
///
/// # Errors
/// Returns `sqlx::Error` if the URL is invalid or the connection fails.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new().max_connections(5).connect_with(options).await
}

/// Creates the queue tables and seeds the system registry.
///
/// Every statement is idempotent, so this is safe to run on every boot.
///
/// # Errors
/// Returns `sqlx::Error` if a statement fails.
pub async fn migrate(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS content (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            alt_body TEXT NOT NULL,
            attachments TEXT NOT NULL,
            last_action_ts INTEGER NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS outbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            state INTEGER NOT NULL DEFAULT 2,
            priority INTEGER NOT NULL DEFAULT 6,
            last_action_ts INTEGER NOT NULL DEFAULT 0,
            send_from TEXT NOT NULL,
            reply_to TEXT NOT NULL,
            send_to TEXT NOT NULL,
            send_cc TEXT NOT NULL,
            send_bcc TEXT NOT NULL,
            content_id INTEGER NOT NULL,
            error TEXT NOT NULL DEFAULT '',
            attempts INTEGER NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS sentbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            last_action_ts INTEGER NOT NULL DEFAULT 0,
            send_from TEXT NOT NULL,
            reply_to TEXT NOT NULL,
            send_to TEXT NOT NULL,
            send_cc TEXT NOT NULL,
            send_bcc TEXT NOT NULL,
            content_id INTEGER NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS system (
            ref TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    for (key, value) in [
        (system_repo::KEY_DB_VERSION, system_repo::SCHEMA_VERSION),
        (system_repo::KEY_LAST_REFRESH, "0"),
        (system_repo::KEY_LAST_ROTATE, "0"),
        (system_repo::KEY_LAST_FLUSH, "0"),
    ] {
        sqlx::query("INSERT OR IGNORE INTO system (ref, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }

    Ok(())
}
