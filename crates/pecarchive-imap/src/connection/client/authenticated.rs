//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::states::{Authenticated, Selected};
use super::{Client, Rejected};
use crate::command::Command;
use crate::parser::UntaggedResponse;
use crate::types::MailboxStatus;

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Opens a mailbox read-only.
    ///
    /// On failure the authenticated client is handed back inside
    /// [`Rejected`] so a missing folder does not cost the connection.
    pub async fn examine(
        mut self,
        mailbox: &str,
    ) -> std::result::Result<Client<S, Selected>, Rejected<Self>> {
        let command = Command::Examine {
            mailbox: mailbox.to_string(),
        };

        match self.execute(&command).await {
            Ok(untagged) => {
                let status = mailbox_status(&untagged);
                tracing::debug!(mailbox, exists = status.exists, "mailbox opened");
                Ok(self.transition(Selected::new(mailbox, status)))
            }
            Err(error) => Err(Rejected {
                client: self,
                error,
            }),
        }
    }

    /// Logs out and closes the connection.
    pub async fn logout(self) {
        self.finish().await;
    }
}

/// Collects the mailbox snapshot from EXAMINE's untagged data.
fn mailbox_status(untagged: &[UntaggedResponse]) -> MailboxStatus {
    let mut status = MailboxStatus {
        read_only: true,
        ..MailboxStatus::default()
    };

    for response in untagged {
        match response {
            UntaggedResponse::Exists(n) => status.exists = *n,
            UntaggedResponse::Recent(n) => status.recent = *n,
            UntaggedResponse::Status {
                code: Some(code), ..
            } => {
                if let Some(value) = code.strip_prefix("UIDVALIDITY ") {
                    status.uid_validity = value.trim().parse().ok();
                }
            }
            _ => {}
        }
    }

    status
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::*;
    use crate::Error;

    async fn logged_in(
        mock: tokio_test::io::Mock,
    ) -> Client<tokio_test::io::Mock, Authenticated> {
        Client::from_stream(mock, Duration::from_secs(5))
            .await
            .unwrap()
            .login("u", "p")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_examine_collects_status() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN u p\r\n")
            .read(b"A0001 OK done\r\n")
            .write(b"A0002 EXAMINE INBOX\r\n")
            .read(b"* 17 EXISTS\r\n* 2 RECENT\r\n")
            .read(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n")
            .read(b"A0002 OK [READ-ONLY] EXAMINE completed\r\n")
            .build();

        let client = logged_in(mock).await;
        let selected = client.examine("INBOX").await.unwrap();

        assert_eq!(selected.state.mailbox(), "INBOX");
        assert_eq!(selected.state.exists(), 17);
        assert_eq!(selected.state.status().recent, 2);
        assert_eq!(selected.state.status().uid_validity, Some(3_857_529_045));
    }

    #[tokio::test]
    async fn test_examine_rejected_returns_client() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN u p\r\n")
            .read(b"A0001 OK done\r\n")
            .write(b"A0002 EXAMINE Missing\r\n")
            .read(b"A0002 NO Mailbox does not exist\r\n")
            .write(b"A0003 EXAMINE INBOX\r\n")
            .read(b"* 0 EXISTS\r\nA0003 OK done\r\n")
            .build();

        let client = logged_in(mock).await;
        let rejected = client.examine("Missing").await.unwrap_err();
        assert!(matches!(rejected.error, Error::No(_)));
        assert!(!rejected.error.is_session_fatal());

        let selected = rejected.client.examine("INBOX").await.unwrap();
        assert_eq!(selected.state.exists(), 0);
    }
}
