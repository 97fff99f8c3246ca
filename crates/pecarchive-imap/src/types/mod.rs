//! Core IMAP types used by the archival client.

mod identifiers;
mod mailbox;
mod search_date;

pub use identifiers::{Tag, Uid};
pub use mailbox::{MailboxStatus, Status};
pub use search_date::SearchDate;
