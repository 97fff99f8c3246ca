//! Mailbox access behind a trait, so the pipeline can run against a real
//! IMAP server or an in-memory fake.

use async_trait::async_trait;
use chrono::NaiveDate;
use pecarchive_imap::{Session, Uid};
use tracing::debug;

use crate::config::{Account, ImapSettings};

/// A message body returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Server UID.
    pub uid: u32,
    /// Exact message bytes.
    pub body: Vec<u8>,
}

/// An authenticated, read-only mailbox session.
#[async_trait]
pub trait Mailbox: Send {
    /// Opens `folder` read-only and returns its message count.
    async fn select_folder(&mut self, folder: &str) -> pecarchive_imap::Result<u32>;

    /// UIDs of messages the server dates on `date`, ascending.
    async fn search_by_date(&mut self, date: NaiveDate) -> pecarchive_imap::Result<Vec<u32>>;

    /// Full raw content of the given UIDs. UIDs the server no longer has are
    /// simply missing from the result.
    async fn fetch_batch(&mut self, uids: &[u32]) -> pecarchive_imap::Result<Vec<RawMessage>>;

    /// Logs out. Never fails.
    async fn disconnect(&mut self);
}

/// Opens mailbox sessions for accounts.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects and logs in.
    async fn connect(
        &self,
        account: &Account,
        settings: &ImapSettings,
    ) -> pecarchive_imap::Result<Box<dyn Mailbox>>;
}

/// Connects over implicit TLS with the configured timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector;

#[async_trait]
impl Connector for ImapConnector {
    async fn connect(
        &self,
        account: &Account,
        settings: &ImapSettings,
    ) -> pecarchive_imap::Result<Box<dyn Mailbox>> {
        let config = pecarchive_imap::Config::builder(&account.host)
            .port(account.port)
            .timeout(settings.timeout())
            .build();
        debug!(host = %account.host, port = account.port, "connecting");
        let session = Session::connect(&config, &account.username, &account.password).await?;
        Ok(Box::new(session))
    }
}

#[async_trait]
impl Mailbox for Session {
    async fn select_folder(&mut self, folder: &str) -> pecarchive_imap::Result<u32> {
        Self::select_folder(self, folder).await
    }

    async fn search_by_date(&mut self, date: NaiveDate) -> pecarchive_imap::Result<Vec<u32>> {
        let uids = self.search_on(date).await?;
        Ok(uids.into_iter().map(Uid::get).collect())
    }

    async fn fetch_batch(&mut self, uids: &[u32]) -> pecarchive_imap::Result<Vec<RawMessage>> {
        let uids: Vec<Uid> = uids.iter().copied().filter_map(Uid::new).collect();
        let fetched = self.fetch_raw(&uids).await?;
        Ok(fetched
            .into_iter()
            .map(|m| RawMessage {
                uid: m.uid.get(),
                body: m.body,
            })
            .collect())
    }

    async fn disconnect(&mut self) {
        Self::disconnect(self).await;
    }
}
