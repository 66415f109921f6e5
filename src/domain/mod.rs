pub mod address;
pub mod message;
pub mod status;

pub use address::Address;
pub use message::{Attachment, OutgoingMessage};
pub use status::{SendState, SendingStatus, priority};
