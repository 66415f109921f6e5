use clap::{Args, Parser, ValueEnum};

use crate::domain::{Address, OutgoingMessage, address};

const SECS_PER_DAY: i64 = 86_400;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "POSTROOM_DATABASE_URL", default_value = "sqlite:postroom.db")]
    pub database_url: String,

    #[command(flatten)]
    pub queue: QueueConfig,

    #[command(flatten)]
    pub delivery: DeliveryConfig,

    #[command(flatten)]
    pub template: TemplateConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct QueueConfig {
    /// Maximum delivery attempts before a row goes inert (clamped to 1-20)
    #[arg(long, env = "POSTROOM_MAX_SENDING_ATTEMPTS", default_value_t = 9)]
    pub max_sending_attempts: i64,

    /// Retention of sent and abandoned mail in days (clamped to 0-730; 0 disables the flush)
    #[arg(long, env = "POSTROOM_SENT_TTL_DAYS", default_value_t = 390)]
    pub sent_ttl_days: i64,

    /// Minimum seconds between scheduled-mail refresh sweeps
    #[arg(long, env = "POSTROOM_REFRESH_INTERVAL_SECS", default_value_t = 30)]
    pub refresh_interval_secs: i64,

    /// Minimum seconds between TTL flush sweeps
    #[arg(long, env = "POSTROOM_FLUSH_INTERVAL_SECS", default_value_t = 3600)]
    pub flush_interval_secs: i64,
}

impl QueueConfig {
    /// The attempt cap actually applied by the engine.
    #[must_use]
    pub fn max_sending_attempts(&self) -> i64 {
        self.max_sending_attempts.clamp(1, 20)
    }

    /// Retention window in seconds; zero disables the flush entirely.
    #[must_use]
    pub fn sent_ttl_secs(&self) -> i64 {
        self.sent_ttl_days.clamp(0, 730) * SECS_PER_DAY
    }
}

#[derive(Clone, Debug, Args)]
pub struct DeliveryConfig {
    /// How often the worker polls the queue for the next message
    #[arg(long, env = "POSTROOM_WORKER_INTERVAL_SECS", default_value_t = 10)]
    pub worker_interval_secs: u64,

    /// Per-send timeout; a timed-out send counts as a delivery failure
    #[arg(long, env = "POSTROOM_SEND_TIMEOUT_SECS", default_value_t = 60)]
    pub send_timeout_secs: u64,
}

/// Organization-wide message defaults. Any field a caller leaves unset on an
/// outgoing message is filled in from here before validation.
#[derive(Clone, Debug, Args)]
pub struct TemplateConfig {
    /// Default From address
    #[arg(long, env = "POSTROOM_DEFAULT_FROM", default_value = "")]
    pub default_from: String,

    /// Default From display name
    #[arg(long, env = "POSTROOM_DEFAULT_FROM_NAME", default_value = "")]
    pub default_from_name: String,

    /// Default Reply-To list in "addr,name;addr,name;..." format
    #[arg(long, env = "POSTROOM_DEFAULT_REPLY_TO", default_value = "")]
    pub default_reply_to: String,

    /// Default subject line
    #[arg(long, env = "POSTROOM_DEFAULT_SUBJECT", default_value = "")]
    pub default_subject: String,
}

impl TemplateConfig {
    /// Builds the default message template applied by the mailer.
    #[must_use]
    pub fn template(&self) -> OutgoingMessage {
        OutgoingMessage {
            from: Address::new(self.default_from.clone(), self.default_from_name.clone()),
            reply_to: address::parse_addresses(&self.default_reply_to),
            subject: self.default_subject.clone(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "POSTROOM_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
