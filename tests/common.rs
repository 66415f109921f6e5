use std::collections::VecDeque;
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use postroom::config::{DeliveryConfig, QueueConfig};
use postroom::domain::{Address, OutgoingMessage};
use postroom::storage::{self, DbPool};
use postroom::transport::{Transport, TransportError};
use sqlx::sqlite::SqlitePoolOptions;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("postroom=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// A fresh single-connection in-memory database with the schema applied.
/// Single connection because every `sqlite::memory:` connection is its own
/// database.
pub async fn test_pool() -> DbPool {
    setup_tracing();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");

    storage::migrate(&pool).await.expect("failed to run migrations");
    pool
}

#[allow(dead_code)]
pub fn queue_config() -> QueueConfig {
    QueueConfig {
        max_sending_attempts: 9,
        sent_ttl_days: 30,
        // Maintenance runs on every pass unless a test raises these.
        refresh_interval_secs: 0,
        flush_interval_secs: 0,
    }
}

#[allow(dead_code)]
pub fn delivery_config() -> DeliveryConfig {
    DeliveryConfig { worker_interval_secs: 1, send_timeout_secs: 5 }
}

#[allow(dead_code)]
pub fn sample_message(subject: &str) -> OutgoingMessage {
    OutgoingMessage {
        from: Address::new("ops@example.org", "Operations"),
        to: vec![Address::new("user@example.org", "User")],
        subject: subject.to_owned(),
        body: format!("<p>{subject}</p>"),
        alt_body: subject.to_owned(),
        ..Default::default()
    }
}

/// Scripted transport: send outcomes are popped from a queue, and an empty
/// queue means success. Every accepted message is recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<Result<(), String>>>,
    pub delivered: Mutex<Vec<OutgoingMessage>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn failing(times: usize, error: &str) -> Self {
        let transport = Self::default();
        for _ in 0..times {
            transport.push_failure(error);
        }
        transport
    }

    pub fn push_failure(&self, error: &str) {
        self.outcomes.lock().unwrap().push_back(Err(error.to_owned()));
    }

    pub fn push_success(&self) {
        self.outcomes.lock().unwrap().push_back(Ok(()));
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
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
        let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()));
        match outcome {
            Ok(()) => {
                self.delivered.lock().unwrap().push(message.clone());
                Ok(())
            }
            Err(e) => Err(TransportError::Delivery(e)),
        }
    }
}
