//! # pecarchive-imap
//!
//! A small, read-only IMAP client for archiving one day of mail at a time.
//!
//! Only the commands an archiver needs are implemented: LOGIN, EXAMINE,
//! `UID SEARCH ON`, `UID FETCH (UID BODY.PEEK[])`, CLOSE and LOGOUT.
//! Mailboxes are always opened with EXAMINE and bodies are fetched with
//! `BODY.PEEK[]`, so the remote mailbox is never modified.
//!
//! ## Quick Start
//!
//! ```ignore
//! use pecarchive_imap::{Config, Session};
//!
//! let config = Config::new("imap.pec.example.it");
//! let mut session = Session::connect(&config, "user@pec.example.it", "secret").await?;
//! let count = session.select_folder("INBOX").await?;
//! let uids = session.search_on(date).await?;
//! let messages = session.fetch_raw(&uids).await?;
//! session.disconnect().await;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! NotAuthenticated ── login() ──→ Authenticated ── examine() ──→ Selected
//!                                       ↑                            │
//!                                       └────────── close() ─────────┘
//! ```

#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, ConfigBuilder, FetchedMessage, FramedStream, ImapStream,
    NotAuthenticated, Rejected, Security, Selected, Session,
};
pub use error::{Error, Result};
pub use parser::{FetchData, Response, ResponseParser, UntaggedResponse};
pub use types::{MailboxStatus, SearchDate, Status, Tag, Uid};
