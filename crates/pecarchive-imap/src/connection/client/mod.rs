//! Type-state IMAP client connection.
//!
//! The connection states are tracked in the type parameter:
//!
//! - `NotAuthenticated`: after the greeting
//! - `Authenticated`: after LOGIN
//! - `Selected`: after EXAMINE
//!
//! Each state only exposes the commands that are valid in it. Transitions
//! consume the client; a rejected EXAMINE hands the authenticated client
//! back through [`Rejected`] so the caller can move on to the next folder.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use tokio::io::{AsyncRead, AsyncWrite};

pub use self::selected::FetchedMessage;
pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::FramedStream;
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Status, Tag};
use crate::{Error, Result};

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<String>,
    pub(crate) state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A command the server refused, together with the client that issued it.
///
/// If [`Error::is_session_fatal`] holds for `error`, the client should be
/// dropped rather than reused.
#[derive(Debug)]
pub struct Rejected<C> {
    /// The client, still in the state it was in before the command.
    pub client: C,
    /// Why the command failed.
    pub error: Error,
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Checks for a capability, case-insensitively.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Moves the connection into another state.
    pub(crate) fn transition<Next>(self, state: Next) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            state,
        }
    }

    /// Runs one command to completion.
    ///
    /// Returns the untagged responses on a tagged OK, and maps NO/BAD to
    /// [`Error::No`]/[`Error::Bad`]. Each socket read and write is bounded
    /// by the stream's idle timeout, not the round-trip as a whole.
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<Vec<UntaggedResponse>> {
        let tag = Tag::new(self.tag_gen.next_tag());
        let bytes = command.serialize(tag.as_str());

        tracing::trace!(tag = %tag, command = command.name(), "sending command");

        let raw = self.stream.exchange(&bytes, &tag).await?;

        let mut untagged = Vec::with_capacity(raw.len().saturating_sub(1));
        let mut completion = None;
        for line in &raw {
            match ResponseParser::parse(line)? {
                Response::Untagged(UntaggedResponse::Capability(caps)) => {
                    self.capabilities.clone_from(&caps);
                    untagged.push(UntaggedResponse::Capability(caps));
                }
                Response::Untagged(response) => untagged.push(response),
                Response::Tagged {
                    tag: resp_tag,
                    status,
                    text,
                    ..
                } if resp_tag == tag => completion = Some((status, text)),
                Response::Tagged { .. } | Response::Continuation { .. } => {}
            }
        }

        match completion {
            Some((Status::Ok | Status::PreAuth, _)) => Ok(untagged),
            Some((Status::No, text)) => Err(Error::No(text)),
            Some((Status::Bad, text)) => Err(Error::Bad(text)),
            Some((Status::Bye, text)) => Err(Error::Bye(text)),
            None => Err(Error::Protocol(format!(
                "missing completion for {}",
                command.name()
            ))),
        }
    }

    /// Sends LOGOUT and closes the stream. Failures are ignored because the
    /// connection is being discarded either way.
    pub(crate) async fn finish(mut self) {
        if let Err(error) = self.execute(&Command::Logout).await {
            tracing::debug!(%error, "LOGOUT did not complete cleanly");
        }
        let _ = self.stream.shutdown().await;
    }
}
