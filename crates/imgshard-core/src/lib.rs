//! Concurrent, bounded, retry-aware shard download pipeline.
//!
//! Data flow per shard: [`shard`] loads rows -> [`pipeline`] admits rows
//! under a semaphore and dispatches each through [`retry`]/[`fetch`] ->
//! [`pipeline`] drains fetch results unordered -> [`processor`] runs the
//! per-row state machine against the external [`resizer::Resizer`] and
//! [`writer::SampleWriter`] -> [`orchestrator`] finalises stats and
//! deletes the source shard.

pub mod config;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod key;
pub mod orchestrator;
pub mod pipeline;
pub mod processor;
pub mod resizer;
pub mod retry;
pub mod row;
pub mod semaphore;
pub mod shard;
pub mod stats;
pub mod writer;

pub use config::DownloaderConfig;
pub use error::{FetchError, OrchestratorError};
pub use hash::HashAlgo;
pub use key::{format_key, p_digits};
pub use orchestrator::{process_shard, ShardOutcome};
pub use processor::RowCounters;
pub use resizer::{CenterCropResizer, ResizeOutcome, Resizer};
pub use row::{ColumnValue, FetchOutcome, Row, RowOutcome, Status, SubOutcome, UrlSpec};
pub use shard::{meta_column_names, output_schema, ColumnIndex, LocalIpcSource, ShardSource};
pub use stats::{CappedStatusCounter, JsonStatsSink, ShardStats, StatsSink};
pub use writer::{ArrowSampleWriter, MultiImageWriter, SampleWriter, WriterRecord};
