//! High-level archival session.
//!
//! `Session` wraps the type-state [`Client`] behind a `&mut self` API so a
//! caller can walk several folders without threading client values around.
//! Command rejections (NO/BAD) leave the session usable; transport failures
//! drop the connection and every later call reports [`Error::InvalidState`].

use std::time::Duration;

use chrono::NaiveDate;
use tokio::io::{AsyncRead, AsyncWrite};

use super::client::{Authenticated, Client, FetchedMessage, Selected};
use super::config::Config;
use super::stream::{ImapStream, connect};
use crate::types::Uid;
use crate::{Error, Result};

enum SessionState<S> {
    Disconnected,
    Authenticated(Client<S, Authenticated>),
    Selected(Client<S, Selected>),
}

/// An authenticated connection to one mailbox account.
pub struct Session<S = ImapStream> {
    state: SessionState<S>,
}

impl Session<ImapStream> {
    /// Connects to the server and logs in.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, TLS handshake, greeting, or
    /// LOGIN fails or times out.
    pub async fn connect(config: &Config, username: &str, password: &str) -> Result<Self> {
        tracing::debug!(host = %config.host, port = config.port, "connecting");
        let stream = connect(config).await?;
        Self::login(stream, config.io_timeout, username, password).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the greeting from an already-open stream and logs in.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting or LOGIN fails or times out.
    pub async fn login(
        stream: S,
        io_timeout: Duration,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let client = Client::from_stream(stream, io_timeout).await?;
        let client = client.login(username, password).await?;
        Ok(Self {
            state: SessionState::Authenticated(client),
        })
    }

    /// Returns true until the connection has been lost or closed.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        !matches!(self.state, SessionState::Disconnected)
    }

    /// Returns the open folder, if any.
    #[must_use]
    pub fn selected_folder(&self) -> Option<&str> {
        match &self.state {
            SessionState::Selected(client) => Some(client.selected().mailbox()),
            _ => None,
        }
    }

    /// Opens `folder` read-only and returns its message count.
    ///
    /// Any previously open folder is closed first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`]/[`Error::Bad`] if the server refuses the folder;
    /// the session stays usable in that case.
    pub async fn select_folder(&mut self, folder: &str) -> Result<u32> {
        let client = match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Disconnected => return Err(not_connected()),
            SessionState::Authenticated(client) => client,
            SessionState::Selected(client) => client.close().await?,
        };

        match client.examine(folder).await {
            Ok(selected) => {
                let exists = selected.selected().exists();
                self.state = SessionState::Selected(selected);
                Ok(exists)
            }
            Err(rejected) => {
                if rejected.error.is_session_fatal() {
                    tracing::debug!(folder, error = %rejected.error, "connection lost on EXAMINE");
                } else {
                    self.state = SessionState::Authenticated(rejected.client);
                }
                Err(rejected.error)
            }
        }
    }

    /// Returns the UIDs in the open folder whose internal date is `date`.
    ///
    /// # Errors
    ///
    /// Returns an error if no folder is open or the search fails.
    pub async fn search_on(&mut self, date: NaiveDate) -> Result<Vec<Uid>> {
        let SessionState::Selected(client) = &mut self.state else {
            return Err(Error::InvalidState("no folder selected".into()));
        };
        let result = client.uid_search_on(date).await;
        self.drop_if_fatal(result)
    }

    /// Fetches raw message bodies from the open folder.
    ///
    /// # Errors
    ///
    /// Returns an error if no folder is open or the fetch fails.
    pub async fn fetch_raw(&mut self, uids: &[Uid]) -> Result<Vec<FetchedMessage>> {
        let SessionState::Selected(client) = &mut self.state else {
            return Err(Error::InvalidState("no folder selected".into()));
        };
        let result = client.uid_fetch_raw(uids).await;
        self.drop_if_fatal(result)
    }

    /// Logs out and closes the connection. Never fails; problems are only
    /// logged.
    pub async fn disconnect(&mut self) {
        match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Disconnected => {}
            SessionState::Authenticated(client) => client.logout().await,
            SessionState::Selected(client) => client.logout().await,
        }
    }

    fn drop_if_fatal<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result
            && error.is_session_fatal()
        {
            tracing::debug!(%error, "dropping broken connection");
            self.state = SessionState::Disconnected;
        }
        result
    }
}

fn not_connected() -> Error {
    Error::InvalidState("not connected".into())
}
