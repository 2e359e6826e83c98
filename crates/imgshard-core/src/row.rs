//! Row-level data model (§3).

use std::collections::HashMap;

/// A single projected column value, mirroring one cell of the "opaque
/// ordered tuple" payload described in §3. Only the shapes the pipeline
/// actually inspects (urls, a caption string, a verification hash string,
/// a bbox list) need variants; anything else round-trips as `Str`/`Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Str(String),
    F64List(Vec<f64>),
}

impl ColumnValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64_list(&self) -> Option<&[f64]> {
        match self {
            Self::F64List(v) => Some(v),
            _ => None,
        }
    }
}

/// `url` cell shape: a single URL, or an ordered list of URLs where
/// elements may be `None` (skipped, per §3).
#[derive(Debug, Clone, PartialEq)]
pub enum UrlSpec {
    Single(String),
    List(Vec<Option<String>>),
}

/// One input sample (§3).
#[derive(Debug, Clone)]
pub struct Row {
    pub row_index: u64,
    pub url: UrlSpec,
    /// Payload columns in `column_list` order, including `url`.
    pub payload: Vec<ColumnValue>,
}

/// Outcome of one HTTP GET attempt (C1).
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Payload(bytes::Bytes),
    Error(String),
}

/// Result of C2 for one `Row`: either a single fetch outcome, or one
/// outcome per non-null URL in a list-URL row, order preserved.
#[derive(Debug, Clone)]
pub enum RawRowResult {
    Single(FetchOutcome),
    List(Vec<FetchOutcome>),
}

/// Terminal status of a `SubOutcome` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    FailedToDownload,
    FailedToResize,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::FailedToDownload => "failed_to_download",
            Self::FailedToResize => "failed_to_resize",
        }
    }
}

/// Per-URL result (§3). For single-URL rows, a `RowOutcome` carries
/// exactly one of these; for list-URL rows, one per non-null input URL.
#[derive(Debug, Clone)]
pub struct SubOutcome {
    pub status: Status,
    pub error_message: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub original_width: Option<i32>,
    pub original_height: Option<i32>,
    pub exif: Option<String>,
    pub hash: Option<String>,
    /// Echoed payload columns (minus the verification-hash column),
    /// keyed by column name, plus `key`.
    pub meta: HashMap<String, ColumnValue>,
}

impl SubOutcome {
    /// A freshly-initialised outcome before any stage has run: all
    /// schema-appended fields null/empty, per §4.6 "Build `meta`".
    pub fn blank(meta: HashMap<String, ColumnValue>) -> Self {
        Self {
            status: Status::FailedToDownload,
            error_message: String::new(),
            width: None,
            height: None,
            original_width: None,
            original_height: None,
            exif: None,
            hash: None,
            meta,
        }
    }
}

/// Result of C6 for one `Row` (§3).
#[derive(Debug, Clone)]
pub enum RowOutcome {
    Single(SubOutcome),
    List(Vec<SubOutcome>),
}

impl RowOutcome {
    /// §3 invariant 3: a list-URL row is successful iff any sub-outcome
    /// succeeded.
    pub fn is_success(&self) -> bool {
        match self {
            Self::Single(s) => matches!(s.status, Status::Success),
            Self::List(subs) => subs.iter().any(|s| matches!(s.status, Status::Success)),
        }
    }
}
