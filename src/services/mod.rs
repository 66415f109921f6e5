pub mod mailer;
pub mod queue;

pub use mailer::{Mailer, ProcessOutcome, SendReport};
pub use queue::{DequeuedMessage, OutboxEntry, QueueHandler, SentboxEntry};
