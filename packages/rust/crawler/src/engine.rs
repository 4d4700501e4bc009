//! Concurrent article fetcher.
//!
//! Every candidate URL is fetched and parsed independently under a shared
//! concurrency limit. A URL that fails for any reason (blocked target, network
//! error, bad status, missing title or text) simply contributes no item.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use meetnews_shared::{CandidateItem, FetchConfig, MeetNewsError, Result};

use crate::extract::extract_article;

/// User-Agent string for article requests.
const USER_AGENT: &str = concat!("MeetNews/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Turns candidate URLs into parsed news items.
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Fetch and parse `urls`. Failed URLs are skipped, never surfaced.
    async fn fetch_articles(&self, urls: &[String]) -> Vec<CandidateItem>;
}

// ---------------------------------------------------------------------------
// ArticleFetcher
// ---------------------------------------------------------------------------

/// HTTP article fetcher with bounded concurrency and an SSRF guard.
pub struct ArticleFetcher {
    client: Client,
    concurrency: usize,
    max_chars: usize,
    /// Allow localhost/private IPs (for tests against mock servers).
    allow_localhost: bool,
}

impl ArticleFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        if config.max_chars == 0 {
            return Err(MeetNewsError::config("[fetch] max_chars must be greater than 0"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MeetNewsError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            concurrency: config.concurrency.max(1) as usize,
            max_chars: config.max_chars,
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }
}

#[async_trait]
impl FetchClient for ArticleFetcher {
    #[instrument(skip_all, fields(urls = urls.len()))]
    async fn fetch_articles(&self, urls: &[String]) -> Vec<CandidateItem> {
        let start_time = std::time::Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(urls.len());
        let mut blocked = 0usize;

        for raw in urls {
            let url = match Url::parse(raw) {
                Ok(u) => u,
                Err(e) => {
                    debug!(url = %raw, error = %e, "unparseable URL, skipping");
                    continue;
                }
            };

            if !self.allow_localhost && is_ssrf_target(&url) {
                warn!(%url, "SSRF protection: blocked");
                blocked += 1;
                continue;
            }

            let client = self.client.clone();
            let sem = semaphore.clone();
            let max_chars = self.max_chars;

            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| MeetNewsError::Network(format!("fetch limiter closed: {e}")))?;
                fetch_article(&client, &url, max_chars).await
            }));
        }

        // Collect in submission order; first copy of a body wins.
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut failed = 0usize;
        let mut duplicates = 0usize;

        for handle in handles {
            match handle.await {
                Ok(Ok(item)) => {
                    if seen.insert(compute_hash(item.text_str())) {
                        items.push(item);
                    } else {
                        debug!(url = %item.url, "duplicate article body, skipping");
                        duplicates += 1;
                    }
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "article dropped");
                    failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "fetch task failed");
                    failed += 1;
                }
            }
        }

        info!(
            fetched = items.len(),
            failed,
            blocked,
            duplicates,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "fetch completed"
        );
        items
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Fetch one page and extract it into a candidate item.
async fn fetch_article(client: &Client, url: &Url, max_chars: usize) -> Result<CandidateItem> {
    debug!(%url, "fetching article");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| MeetNewsError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(MeetNewsError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| MeetNewsError::Network(format!("{url}: body read failed: {e}")))?;

    let article = extract_article(&body, max_chars)
        .map_err(|e| MeetNewsError::parse(format!("{url}: {e}")))?;

    Ok(CandidateItem::new(url.as_str(), article.title, article.text))
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
