use serde::{Deserialize, Serialize};

/// Delivery state of an outbox row.
///
/// The discriminants are the persisted column values and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum SendState {
    Failed = 0,
    Succeeded = 1,
    Pending = 2,
    Scheduled = 3,
}

impl SendState {
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for SendState {
    type Error = i64;

    fn try_from(value: i64) -> std::result::Result<Self, i64> {
        match value {
            0 => Ok(Self::Failed),
            1 => Ok(Self::Succeeded),
            2 => Ok(Self::Pending),
            3 => Ok(Self::Scheduled),
            other => Err(other),
        }
    }
}

/// Well-known priority bands. Lower value dequeues first; callers may use
/// any intermediate integer to define their own bands.
pub mod priority {
    pub const SYSTEM: i64 = 0;
    pub const CONTACT: i64 = 3;
    pub const DEFAULT: i64 = 6;
    pub const NEWSLETTER: i64 = 9;
}

/// Transient view of an outbox row's delivery bookkeeping.
///
/// Not persisted as-is: `QueueHandler` maps it to and from the outbox
/// state/priority/error/attempts columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendingStatus {
    pub queue_id: Option<i64>,
    pub state: SendState,
    pub priority: i64,
    pub error: String,
    pub last_action_ts: i64,
    pub attempts: i64,
}

impl Default for SendingStatus {
    fn default() -> Self {
        Self {
            queue_id: None,
            state: SendState::Pending,
            priority: priority::DEFAULT,
            error: String::new(),
            last_action_ts: 0,
            attempts: 0,
        }
    }
}
