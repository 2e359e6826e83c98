//! Per-downloader configuration (§6 "Configuration").

use std::collections::HashSet;

use crate::hash::HashAlgo;

/// Every field spec.md §6 enumerates for a downloader invocation.
/// `sample_writer_class`/`resizer`/`encode_format` are represented as
/// trait objects/strings rather than class names — there is no dynamic
/// class loading in this crate, the CLI picks concrete types at startup.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub thread_count: usize,
    pub save_caption: bool,
    pub extract_exif: bool,
    pub output_folder: std::path::PathBuf,
    pub column_list: Vec<String>,
    pub url_column: String,
    pub caption_column: Option<String>,
    pub blurring_bbox_col: Option<String>,
    pub timeout: u64,
    pub samples_per_shard: u64,
    pub shard_count_oom: u32,
    pub compute_hash: Option<HashAlgo>,
    pub verify_hash_type: Option<HashAlgo>,
    pub verify_hash_column: Option<String>,
    pub encode_format: String,
    pub retries: u32,
    pub user_agent_token: Option<String>,
    pub disallowed_header_directives: HashSet<String>,
}

impl DownloaderConfig {
    /// `user_agent_token`, lowercased and trimmed per §6.
    pub fn normalized_ua_token(&self) -> String {
        self.user_agent_token
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default()
    }

    /// `disallowed_header_directives`, lowercased and trimmed per §6.
    pub fn normalized_disallowed_directives(&self) -> HashSet<String> {
        self.disallowed_header_directives
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect()
    }
}
