//! Fetch phase of one account: connect, walk the folders, save messages.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Account, ImapSettings};
use crate::index::{Indexer, MessageHeaders, MessageRecord};
use crate::mailbox::{Connector, Mailbox, RawMessage};
use crate::retry::{RetryPolicy, with_retry};
use crate::Error;
use crate::storage::Storage;

/// What one fetch phase needs to know.
pub struct FetchContext<'a> {
    pub connector: &'a dyn Connector,
    pub account: &'a Account,
    pub date: NaiveDate,
    pub imap: &'a ImapSettings,
    /// Already created by the storage layer.
    pub day_dir: &'a Path,
}

/// An attempt that lost its session. Errors recorded before the loss travel
/// with it so they survive retry exhaustion.
#[derive(Debug)]
struct AttemptFailure {
    error: Error,
    recorded: Vec<Error>,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

/// Runs the fetch phase under the retry policy.
///
/// Saved messages go into `indexer` across all attempts; re-fetched ones
/// replace their earlier record. Only the errors of the last attempt are
/// returned.
pub async fn fetch_day(
    ctx: &FetchContext<'_>,
    retry: &RetryPolicy,
    indexer: &Mutex<Indexer>,
) -> Vec<Error> {
    match with_retry(retry, "fetch", || attempt(ctx, indexer)).await {
        Ok(recorded) => recorded,
        Err(failure) => {
            warn!(
                account = %ctx.account.username,
                error = %failure.error,
                "fetch phase failed after retries"
            );
            let mut recorded = failure.recorded;
            recorded.push(failure.error);
            recorded
        }
    }
}

async fn attempt(
    ctx: &FetchContext<'_>,
    indexer: &Mutex<Indexer>,
) -> Result<Vec<Error>, AttemptFailure> {
    let mut session = ctx
        .connector
        .connect(ctx.account, ctx.imap)
        .await
        .map_err(|e| AttemptFailure {
            error: Error::Connection(e.to_string()),
            recorded: Vec::new(),
        })?;
    debug!(account = %ctx.account.username, "logged in");

    let mut recorded = Vec::new();
    let mut lost = None;
    for folder in &ctx.account.folders {
        if let Err(e) = fetch_folder(session.as_mut(), ctx, folder, indexer, &mut recorded).await {
            lost = Some(e);
            break;
        }
    }
    session.disconnect().await;

    match lost {
        None => Ok(recorded),
        Some(e) => Err(AttemptFailure {
            error: Error::Connection(format!("session lost: {e}")),
            recorded,
        }),
    }
}

/// Archives one folder. Only errors that end the session are returned;
/// everything else is recorded and skipped.
async fn fetch_folder(
    session: &mut dyn Mailbox,
    ctx: &FetchContext<'_>,
    folder: &str,
    indexer: &Mutex<Indexer>,
    recorded: &mut Vec<Error>,
) -> pecarchive_imap::Result<()> {
    let folder_error = |e: &pecarchive_imap::Error| Error::Folder {
        folder: folder.to_string(),
        message: e.to_string(),
    };

    let count = match session.select_folder(folder).await {
        Ok(count) => count,
        Err(e) if e.is_session_fatal() => return Err(e),
        Err(e) => {
            warn!(folder, error = %e, "cannot open folder");
            recorded.push(folder_error(&e));
            return Ok(());
        }
    };

    let uids = match session.search_by_date(ctx.date).await {
        Ok(uids) => uids,
        Err(e) if e.is_session_fatal() => return Err(e),
        Err(e) => {
            warn!(folder, error = %e, "search failed");
            recorded.push(folder_error(&e));
            return Ok(());
        }
    };
    info!(folder, total = count, matching = uids.len(), "folder selected");

    for batch in uids.chunks(ctx.imap.batch_size.max(1)) {
        let messages = match session.fetch_batch(batch).await {
            Ok(messages) => {
                let returned: HashSet<u32> = messages.iter().map(|m| m.uid).collect();
                for &uid in batch.iter().filter(|uid| !returned.contains(*uid)) {
                    recorded.push(fetch_error(folder, uid, "message not returned by server"));
                }
                messages
            }
            Err(e) if e.is_session_fatal() => return Err(e),
            Err(e) => {
                warn!(folder, error = %e, size = batch.len(), "batch fetch failed, retrying one by one");
                fetch_one_by_one(session, folder, batch, recorded).await?
            }
        };

        for message in messages {
            save_message(ctx.day_dir, folder, message, indexer, recorded).await;
        }
    }

    Ok(())
}

async fn fetch_one_by_one(
    session: &mut dyn Mailbox,
    folder: &str,
    uids: &[u32],
    recorded: &mut Vec<Error>,
) -> pecarchive_imap::Result<Vec<RawMessage>> {
    let mut messages = Vec::with_capacity(uids.len());
    for &uid in uids {
        match session.fetch_batch(&[uid]).await {
            Ok(mut fetched) => match fetched.pop() {
                Some(message) => messages.push(message),
                None => recorded.push(fetch_error(folder, uid, "message not returned by server")),
            },
            Err(e) if e.is_session_fatal() => return Err(e),
            Err(e) => {
                warn!(folder, uid, error = %e, "message fetch failed");
                recorded.push(fetch_error(folder, uid, &e.to_string()));
            }
        }
    }
    Ok(messages)
}

async fn save_message(
    day_dir: &Path,
    folder: &str,
    message: RawMessage,
    indexer: &Mutex<Indexer>,
    recorded: &mut Vec<Error>,
) {
    let headers = MessageHeaders::parse(&message.body);
    let path = match Storage::save_eml(
        day_dir,
        folder,
        message.uid,
        headers.subject.as_deref(),
        &message.body,
    )
    .await
    {
        Ok(path) => path,
        Err(e) => {
            warn!(folder, uid = message.uid, error = %e, "cannot save message");
            recorded.push(e);
            return;
        }
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let record = MessageRecord::from_headers(
        folder,
        message.uid,
        &filename,
        headers,
        message.body.len() as u64,
    );
    indexer.lock().await.add(record);
}

fn fetch_error(folder: &str, uid: u32, message: &str) -> Error {
    Error::Fetch {
        folder: folder.to_string(),
        uid: Some(uid),
        message: message.to_string(),
    }
}
