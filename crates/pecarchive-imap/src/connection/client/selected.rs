//! Implementation for the selected state.

use chrono::NaiveDate;
use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::Result;
use crate::command::Command;
use crate::parser::UntaggedResponse;
use crate::types::{SearchDate, Uid};

/// A message body retrieved with `UID FETCH ... BODY.PEEK[]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// UID of the message.
    pub uid: Uid,
    /// Exact bytes of the message as stored on the server.
    pub body: Vec<u8>,
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the open mailbox state.
    #[must_use]
    pub const fn selected(&self) -> &Selected {
        &self.state
    }

    /// Finds the messages whose internal date falls on `date`.
    ///
    /// The server interprets the day in its own timezone.
    pub async fn uid_search_on(&mut self, date: NaiveDate) -> Result<Vec<Uid>> {
        let untagged = self
            .execute(&Command::UidSearchOn {
                date: SearchDate::from(date),
            })
            .await?;

        let mut uids: Vec<Uid> = untagged
            .into_iter()
            .filter_map(|response| match response {
                UntaggedResponse::Search(found) => Some(found),
                _ => None,
            })
            .flatten()
            .collect();
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Fetches the full raw bodies of `uids` without setting `\Seen`.
    ///
    /// UIDs that no longer exist are silently absent from the result, as
    /// are FETCH responses without a body (unsolicited flag updates).
    pub async fn uid_fetch_raw(&mut self, uids: &[Uid]) -> Result<Vec<FetchedMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let command = Command::UidFetchRaw {
            uids: uids.iter().map(|uid| uid.get()).collect(),
        };
        let untagged = self.execute(&command).await?;

        Ok(untagged
            .into_iter()
            .filter_map(|response| match response {
                UntaggedResponse::Fetch { data, .. } => Some((data.uid?, data.body?)),
                _ => None,
            })
            .map(|(uid, body)| FetchedMessage { uid, body })
            .collect())
    }

    /// Closes the mailbox and returns to the authenticated state.
    ///
    /// The mailbox was opened with EXAMINE, so nothing is expunged.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        self.execute(&Command::Close).await?;
        Ok(self.transition(Authenticated))
    }

    /// Logs out and closes the connection.
    pub async fn logout(self) {
        self.finish().await;
    }
}
