//! On-demand extraction of single files from day containers.
//!
//! Extracted files live under the cache root at
//! `<date dir>/<container stem>/<member path>` and are evicted least
//! recently used first once the cache grows past its byte budget.

mod error;
mod retrieval;

pub use error::ExtractionError;
pub use retrieval::{RetrievalCache, cache_key};
