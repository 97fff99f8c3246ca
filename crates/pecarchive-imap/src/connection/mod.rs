//! IMAP connection management.
//!
//! - Configuration (host, port, security mode, timeouts)
//! - TLS/plaintext stream abstraction
//! - Framed I/O for IMAP protocol
//! - Type-state client
//! - `Session`, the `&mut self` wrapper used by the archiver

mod client;
mod config;
mod framed;
mod session;
mod stream;

pub use client::{Authenticated, Client, FetchedMessage, NotAuthenticated, Rejected, Selected};
pub use config::{Config, ConfigBuilder, DEFAULT_TIMEOUT, Security};
pub use framed::FramedStream;
pub use session::Session;
pub use stream::{ImapStream, connect, create_tls_connector};
