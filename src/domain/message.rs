use serde::{Deserialize, Serialize};

use super::address::{self, Address};

/// An attached file, stored as a `(path, name)` pair in the content row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: String,
    pub name: String,
}

impl Attachment {
    #[must_use]
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self { path: path.into(), name: name.into() }
    }
}

/// Serializes an attachment list to the persisted column format.
#[must_use]
pub fn format_attachments(attachments: &[Attachment]) -> String {
    address::format_pairs(attachments.iter().map(|a| (a.path.as_str(), a.name.as_str())))
}

/// Parses a persisted attachment list column.
#[must_use]
pub fn parse_attachments(line: &str) -> Vec<Attachment> {
    address::parse_pairs(line).into_iter().map(|(path, name)| Attachment { path, name }).collect()
}

/// A message handed to the transport: envelope addressing plus content.
///
/// The envelope half (from/reply-to/to/cc/bcc) lives in the mailbox rows;
/// the content half (subject/body/alt-body/attachments) is deduplicated in
/// the content table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub from: Address,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub subject: String,
    pub body: String,
    pub alt_body: String,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    /// Fills every field the caller left at its zero value from the
    /// operator-configured default template. Explicitly set fields win.
    pub fn apply_defaults(&mut self, defaults: &Self) {
        fn fill<T: Default + PartialEq + Clone>(field: &mut T, default: &T) {
            if *field == T::default() {
                *field = default.clone();
            }
        }

        fill(&mut self.from, &defaults.from);
        fill(&mut self.reply_to, &defaults.reply_to);
        fill(&mut self.to, &defaults.to);
        fill(&mut self.cc, &defaults.cc);
        fill(&mut self.bcc, &defaults.bcc);
        fill(&mut self.subject, &defaults.subject);
        fill(&mut self.body, &defaults.body);
        fill(&mut self.alt_body, &defaults.alt_body);
        fill(&mut self.attachments, &defaults.attachments);
    }
}
