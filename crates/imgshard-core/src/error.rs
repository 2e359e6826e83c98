//! Error taxonomy for the shard download pipeline (§7).

use std::fmt;

/// Error from a single HTTP fetch attempt (C1).
#[derive(Debug)]
pub enum FetchError {
    /// Network, DNS, timeout, or non-2xx HTTP error. Carries the
    /// stringified cause, which becomes `SubOutcome::error_message`.
    Request(String),
    /// An applicable `X-Robots-Tag` header disallowed the fetch.
    RobotsDisallowed,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "{msg}"),
            Self::RobotsDisallowed => {
                write!(f, "Use of image disallowed by X-Robots-Tag directive")
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Error aborting an entire shard (§7 item 7: pipeline- or writer-level).
///
/// Per-row failures never produce this — they're folded into a
/// `SubOutcome` with a `failed_to_*` status and counted. This variant is
/// reserved for failures that make continuing the shard meaningless.
#[derive(Debug)]
pub enum OrchestratorError {
    Load(String),
    Writer(String),
    Stats(std::io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(msg) => write!(f, "failed to load shard: {msg}"),
            Self::Writer(msg) => write!(f, "writer error: {msg}"),
            Self::Stats(e) => write!(f, "failed to write stats: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {}
