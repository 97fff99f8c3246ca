//! Read-only access to an archive tree.
//!
//! [`ArchiveReader`] lists accounts and days, searches the per-day
//! `index.json` files and serves message files, falling back to the
//! retrieval cache when a message only survives inside its container.

mod error;
mod reader;
mod search;

pub use error::ReadError;
pub use reader::{AccountInfo, ArchiveReader, DateInfo};
pub use search::{SearchHit, SearchQuery, SearchResults};
