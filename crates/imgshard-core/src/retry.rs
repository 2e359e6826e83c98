//! Retry wrapper around [`fetch`] (C2, §4.2).
//!
//! No inter-attempt backoff sleep: the original downloader this pipeline
//! is modeled on (`download_image_with_retry`) loops `retries + 1` times
//! back-to-back with no delay, and retries here exist to survive a flaky
//! single request within one row's processing budget, not to wait out a
//! remote outage across shard-sized units of work.

use std::collections::HashSet;

use crate::fetch::fetch;
use crate::row::{FetchOutcome, RawRowResult, UrlSpec};

/// Attempt `fetch` up to `retries + 1` times, returning the first
/// success or the last failure.
fn fetch_with_retry(
    url: &str,
    retries: u32,
    timeout_secs: u64,
    ua_token: &str,
    disallowed_directives: &HashSet<String>,
) -> FetchOutcome {
    let mut last = FetchOutcome::Error("no attempt made".to_string());
    for _ in 0..=retries {
        last = fetch(url, timeout_secs, ua_token, disallowed_directives);
        if matches!(last, FetchOutcome::Payload(_)) {
            return last;
        }
    }
    last
}

/// Run C2 over a row's `UrlSpec`: one retried fetch for a single URL,
/// or one independent retried fetch per non-null URL for a list, in
/// order (§4.2).
pub fn fetch_row(
    url: &UrlSpec,
    retries: u32,
    timeout_secs: u64,
    ua_token: &str,
    disallowed_directives: &HashSet<String>,
) -> RawRowResult {
    match url {
        UrlSpec::Single(u) => RawRowResult::Single(fetch_with_retry(
            u,
            retries,
            timeout_secs,
            ua_token,
            disallowed_directives,
        )),
        UrlSpec::List(urls) => RawRowResult::List(
            urls.iter()
                .filter_map(|u| u.as_deref())
                .map(|u| fetch_with_retry(u, retries, timeout_secs, ua_token, disallowed_directives))
                .collect(),
        ),
    }
}
