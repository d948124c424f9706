//! Incremental indexing (§4.6) and the NDJSON pipeline driver (§6a) that
//! feeds it from the cleaner's record stream.

pub mod error;
pub mod indexer;
pub mod pipeline;

pub use error::IndexError;
pub use indexer::{IncrementalIndexer, IndexOutcome};
pub use pipeline::{PipelineDriver, PipelineStats, Sync};
