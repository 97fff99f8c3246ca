//! Implementation for the not-authenticated state.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::Status;
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream and reads the greeting.
    ///
    /// `io_timeout` bounds every socket read and write from here on.
    pub async fn from_stream(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut framed = FramedStream::new(stream, io_timeout);
        let greeting = framed.read_response().await?;

        let mut capabilities = Vec::new();
        match ResponseParser::parse(&greeting)? {
            Response::Untagged(UntaggedResponse::Status {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            Response::Untagged(UntaggedResponse::Status { code, .. }) => {
                if let Some(caps) = code
                    .as_deref()
                    .and_then(|c| c.strip_prefix("CAPABILITY "))
                {
                    capabilities = caps.split_whitespace().map(str::to_string).collect();
                }
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            state: NotAuthenticated,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// Consumes the client; credentials are never logged. Fails without
    /// sending anything if the greeting announced `LOGINDISABLED`.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        if self.has_capability("LOGINDISABLED") {
            return Err(Error::Protocol(
                "server does not accept LOGIN on this connection (LOGINDISABLED)".into(),
            ));
        }

        self.execute(&Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;

        tracing::debug!(username, "logged in");
        Ok(self.transition(Authenticated))
    }

    /// Disconnects without authenticating.
    pub async fn logout(self) {
        self.finish().await;
    }
}
