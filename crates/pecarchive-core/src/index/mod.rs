//! Per-day message indexes.
//!
//! The indexer collects one [`MessageRecord`] per archived message and
//! writes them as `index.csv` and `index.json` next to the folder
//! directories. Statistics for the run summary come from the same records.

mod csv;
mod headers;
mod indexer;
mod model;

pub use headers::MessageHeaders;
pub use indexer::Indexer;
pub use model::{IndexStats, MessageRecord};
