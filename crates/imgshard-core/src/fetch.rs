//! URL fetcher (C1, §4.1) — one HTTP GET with timeout, user-agent, and
//! `X-Robots-Tag` filtering.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::FetchError;
use crate::row::FetchOutcome;

const BASE_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:72.0) Gecko/20100101 Firefox/72.0";
const PROJECT_URL: &str = "https://github.com/img2dataset/img2dataset";

/// Shared async HTTP client with connection pooling, mirroring
/// `papeline_core::stream::SHARED_CLIENT`.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .pool_max_idle_per_host(8)
        .build()
        .expect("failed to build HTTP client")
});

/// Shared tokio runtime so the rest of the pipeline can stay thread-based
/// (matches `papeline_core::stream::SHARED_RUNTIME`).
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

fn user_agent_string(ua_token: &str) -> String {
    if ua_token.is_empty() {
        BASE_USER_AGENT.to_string()
    } else {
        format!("{BASE_USER_AGENT} (compatible; {ua_token}; +{PROJECT_URL})")
    }
}

/// Parse one `X-Robots-Tag` header value into `(ua_token, directives)`.
///
/// Split on the *first* colon: a single part means no ua-token (applies
/// to every crawler), two parts means the left side is the ua-token.
/// Both sides are lowercased. Malformed values (directives empty after
/// trimming) are still returned — callers log and skip on `None`.
fn parse_robots_tag(value: &str) -> Option<(Option<String>, Vec<String>)> {
    let mut parts = value.splitn(2, ':');
    let first = parts.next()?;
    match parts.next() {
        Some(rest) => {
            let ua = first.trim().to_lowercase();
            let directives = rest
                .split(',')
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect();
            Some((Some(ua), directives))
        }
        None => {
            let directives = first
                .split(',')
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect();
            Some((None, directives))
        }
    }
}

/// Check whether any applicable `X-Robots-Tag` header disallows use,
/// per §4.1. `ua_token` is expected already-lowercased (the `Downloader`
/// config normalises it once at construction).
fn is_disallowed(
    headers: &reqwest::header::HeaderMap,
    ua_token: &str,
    disallowed: &HashSet<String>,
) -> bool {
    for value in headers.get_all("X-Robots-Tag") {
        let Ok(text) = value.to_str() else {
            log::warn!("Failed to parse X-Robots-Tag: non-UTF8 header value");
            continue;
        };
        match parse_robots_tag(text) {
            Some((tag_ua, directives)) => {
                let applies = match &tag_ua {
                    None => true,
                    Some(ua) => ua.is_empty() || ua == ua_token,
                };
                if applies && directives.iter().any(|d| disallowed.contains(d)) {
                    return true;
                }
            }
            None => {
                log::warn!("Failed to parse X-Robots-Tag: {text}");
            }
        }
    }
    false
}

/// One HTTP GET, buffered fully into memory (C1, §4.1). Returns the
/// typed [`FetchError`] so callers can distinguish a robots-disallowed
/// fetch from a plain request failure before it's flattened to a string.
fn fetch_typed(
    url: &str,
    timeout_secs: u64,
    ua_token: &str,
    disallowed_directives: &HashSet<String>,
) -> Result<bytes::Bytes, FetchError> {
    let user_agent = user_agent_string(ua_token);
    let url = url.to_string();
    let ua_token = ua_token.to_string();
    let disallowed = disallowed_directives.clone();

    SHARED_RUNTIME.handle().block_on(async move {
        let result = SHARED_CLIENT
            .get(&url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let response = result.map_err(|e| FetchError::Request(e.to_string()))?;

        if !disallowed.is_empty() && is_disallowed(response.headers(), &ua_token, &disallowed) {
            return Err(FetchError::RobotsDisallowed);
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))
    })
}

/// [`fetch_typed`] flattened to the `error_message` string carried by
/// [`FetchOutcome`] at the C2/C6 boundary.
pub fn fetch(
    url: &str,
    timeout_secs: u64,
    ua_token: &str,
    disallowed_directives: &HashSet<String>,
) -> FetchOutcome {
    match fetch_typed(url, timeout_secs, ua_token, disallowed_directives) {
        Ok(body) => FetchOutcome::Payload(body),
        Err(e) => FetchOutcome::Error(e.to_string()),
    }
}
