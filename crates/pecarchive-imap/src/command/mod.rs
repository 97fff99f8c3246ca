//! Commands issued by the archival client.
//!
//! Only the read-only subset of the protocol is represented: the archiver
//! never stores flags, expunges, or otherwise mutates a remote mailbox.

mod serialize;
mod tag_generator;

use crate::types::SearchDate;

pub use tag_generator::TagGenerator;

use serialize::{write_astring, write_uid_set};

/// A client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// LOGOUT command.
    Logout,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox to open.
        mailbox: String,
    },
    /// CLOSE command.
    Close,
    /// `UID SEARCH ON <date>`.
    UidSearchOn {
        /// Calendar day, in server date semantics.
        date: SearchDate,
    },
    /// `UID FETCH <set> (UID BODY.PEEK[])`.
    ///
    /// `BODY.PEEK` leaves the `\Seen` flag untouched.
    UidFetchRaw {
        /// UIDs to fetch.
        uids: Vec<u32>,
    },
}

impl Command {
    /// Serializes the command to bytes with the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_astring(&mut buf, mailbox);
            }
            Self::UidSearchOn { date } => {
                buf.extend_from_slice(format!("UID SEARCH ON {date}").as_bytes());
            }
            Self::UidFetchRaw { uids } => {
                buf.extend_from_slice(b"UID FETCH ");
                write_uid_set(&mut buf, uids);
                buf.extend_from_slice(b" (UID BODY.PEEK[])");
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Command name for logging, without arguments.
    ///
    /// LOGIN arguments in particular must never reach the logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Logout => "LOGOUT",
            Self::Close => "CLOSE",
            Self::Login { .. } => "LOGIN",
            Self::Examine { .. } => "EXAMINE",
            Self::UidSearchOn { .. } => "UID SEARCH",
            Self::UidFetchRaw { .. } => "UID FETCH",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_login_serialization() {
        let cmd = Command::Login {
            username: "a@pec.it".into(),
            password: "s3cret".into(),
        };
        assert_eq!(cmd.serialize("A0001"), b"A0001 LOGIN a@pec.it s3cret\r\n");
    }

    #[test]
    fn test_examine_quotes_spaces() {
        let cmd = Command::Examine {
            mailbox: "Posta inviata".into(),
        };
        assert_eq!(cmd.serialize("A0002"), b"A0002 EXAMINE \"Posta inviata\"\r\n");
    }

    #[test]
    fn test_search_on_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let cmd = Command::UidSearchOn { date: date.into() };
        assert_eq!(cmd.serialize("A0003"), b"A0003 UID SEARCH ON 15-Jan-2024\r\n");
    }

    #[test]
    fn test_fetch_uses_peek() {
        let cmd = Command::UidFetchRaw {
            uids: vec![4, 5, 6, 9],
        };
        assert_eq!(
            cmd.serialize("A0004"),
            b"A0004 UID FETCH 4:6,9 (UID BODY.PEEK[])\r\n"
        );
    }

    #[test]
    fn test_name_hides_credentials() {
        let cmd = Command::Login {
            username: "u".into(),
            password: "p".into(),
        };
        assert_eq!(cmd.name(), "LOGIN");
    }
}
