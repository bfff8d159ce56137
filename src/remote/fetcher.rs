//! Rate-limit-aware walker over the remote API's paged bundles.
//!
//! Pages are requested strictly in order with a fixed delay between them.
//! Iteration stops when a page carries no `next` link; the `last` link only
//! feeds progress reporting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{HttpResponse, HttpTransport, RemoteError, TokenManager};

/// Records requested per page.
pub const PAGE_SIZE: u32 = 500;

const PAGE_SIZE_PARAM: &str = "_count";
const PAGE_PARAM: &str = "page";
const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";
const RETRY_AFTER_HEADER: &str = "retry-after";

// ═══════════════════════════════════════════════════════════
// Retry policy
// ═══════════════════════════════════════════════════════════

/// Pacing and 429 backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 429 retries per page before giving up with `RateLimitExceeded`.
    pub max_rate_limit_retries: u32,
    /// Wait used when a 429 carries no usable reset header.
    pub default_wait: Duration,
    /// Upper bound for any single 429 wait.
    pub max_wait: Duration,
    /// Pause between consecutive page requests.
    pub page_delay: Duration,
    /// Pause between concurrent lookup batches.
    pub batch_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 5,
            default_wait: Duration::from_secs(5),
            max_wait: Duration::from_secs(60),
            page_delay: Duration::from_millis(250),
            batch_pause: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Same retry budget, no waiting. For tests.
    pub fn immediate() -> Self {
        Self {
            default_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            page_delay: Duration::ZERO,
            batch_pause: Duration::ZERO,
            ..Self::default()
        }
    }

    /// How long to wait after a 429 received at `now`.
    ///
    /// `X-RateLimit-Reset` (epoch seconds) wins, then `Retry-After`
    /// (seconds), then `default_wait`. Capped at `max_wait`.
    pub fn wait_for(&self, response: &HttpResponse, now: DateTime<Utc>) -> Duration {
        let from_reset = response
            .header(RATE_LIMIT_RESET_HEADER)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|reset| Duration::from_secs((reset - now.timestamp()).max(0) as u64));
        let from_retry_after = || {
            response
                .header(RETRY_AFTER_HEADER)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };
        from_reset
            .or_else(from_retry_after)
            .unwrap_or(self.default_wait)
            .min(self.max_wait)
    }
}

pub(crate) fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

// ═══════════════════════════════════════════════════════════
// Bundle envelope
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct Bundle {
    #[serde(default)]
    entry: Vec<BundleEntry>,
    #[serde(default)]
    link: Vec<BundleLink>,
}

#[derive(Debug, Deserialize)]
struct BundleEntry {
    resource: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BundleLink {
    relation: String,
    url: String,
}

impl Bundle {
    fn link(&self, relation: &str) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation.eq_ignore_ascii_case(relation))
            .map(|l| l.url.as_str())
    }

    fn has_next(&self) -> bool {
        self.link("next").is_some()
    }

    /// Page number carried by the `last` link, if any.
    fn last_page(&self) -> Option<u32> {
        let url = self.link("last")?;
        let parsed = reqwest::Url::parse(url)
            .or_else(|_| reqwest::Url::parse("http://placeholder/").and_then(|base| base.join(url)))
            .ok()?;
        let page = parsed
            .query_pairs()
            .find(|(k, _)| k == PAGE_PARAM)
            .and_then(|(_, v)| v.parse().ok());
        page
    }
}

/// Progress of a paged walk, reported after each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProgress {
    pub page: u32,
    /// From the first `last` link seen; advisory only.
    pub estimated_total: Option<u32>,
    pub records: usize,
}

// ═══════════════════════════════════════════════════════════
// PaginatedFetcher
// ═══════════════════════════════════════════════════════════

pub struct PaginatedFetcher {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    tokens: TokenManager,
    policy: RetryPolicy,
}

impl PaginatedFetcher {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        tokens: TokenManager,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            tokens,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch every resource of a paged collection, in page order.
    ///
    /// `page_limit` stops after that many pages even if more exist.
    pub fn fetch_all(
        &self,
        path: &str,
        filters: &[(&str, String)],
        page_limit: Option<u32>,
        on_page: Option<&dyn Fn(PageProgress)>,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut resources = Vec::new();
        let mut estimated_total = None;
        let mut page = 1u32;

        loop {
            let bundle = self.fetch_page(path, filters, page)?;

            if estimated_total.is_none() {
                estimated_total = bundle.last_page();
            }
            let has_next = bundle.has_next();
            resources.extend(bundle.entry.into_iter().filter_map(|e| e.resource));

            if let Some(report) = on_page {
                report(PageProgress {
                    page,
                    estimated_total,
                    records: resources.len(),
                });
            }

            if !has_next {
                break;
            }
            if page_limit.is_some_and(|limit| page >= limit) {
                tracing::debug!(path, page, "Page limit reached");
                break;
            }

            page += 1;
            pause(self.policy.page_delay);
        }

        tracing::debug!(path, pages = page, records = resources.len(), "Paged fetch complete");
        Ok(resources)
    }

    fn fetch_page(&self, path: &str, filters: &[(&str, String)], page: u32) -> Result<Bundle, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let mut query: Vec<(String, String)> = filters
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        query.push((PAGE_SIZE_PARAM.into(), PAGE_SIZE.to_string()));
        query.push((PAGE_PARAM.into(), page.to_string()));

        // Only 429s spend this budget; the single 401 refresh is tracked apart.
        let mut retries = 0u32;
        let mut reauthenticated = false;

        loop {
            let token = self.tokens.get_token()?;
            let response = self.transport.get(&url, &token, &query)?;

            match response.status {
                429 => {
                    if retries >= self.policy.max_rate_limit_retries {
                        return Err(RemoteError::RateLimitExceeded {
                            path: path.to_string(),
                            page,
                            retries,
                        });
                    }
                    retries += 1;
                    let wait = self.policy.wait_for(&response, Utc::now());
                    tracing::warn!(path, page, retry = retries, wait_ms = wait.as_millis() as u64, "Rate limited, backing off");
                    pause(wait);
                }
                401 if !reauthenticated => {
                    tracing::warn!(path, page, "Token rejected, requesting a new one");
                    self.tokens.invalidate();
                    reauthenticated = true;
                }
                401 => {
                    return Err(RemoteError::Authentication(format!(
                        "token rejected twice for {path}"
                    )));
                }
                status if !response.is_success() => {
                    return Err(RemoteError::Api {
                        status,
                        path: path.to_string(),
                        body: response.body,
                    });
                }
                _ => {
                    return serde_json::from_str(&response.body).map_err(|e| {
                        RemoteError::ResponseParsing(format!("{path} page {page}: {e}"))
                    });
                }
            }
        }
    }
}
