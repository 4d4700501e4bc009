//! Candidate source discovery via web search.
//!
//! Given a record's keywords, MeetNews asks the Google Custom Search JSON API
//! for recent news pages. Page requests are fanned out concurrently and the
//! result links are unioned into a set. Failed pages are dropped; a missing
//! API key or an unreachable endpoint simply yields no candidates.

mod query;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use meetnews_shared::{MeetNewsError, Result, SearchConfig, read_secret};

pub use query::{PageRequest, build_query, plan_pages};

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("MeetNews/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Finds candidate source URLs for a set of keywords.
///
/// Implementations never fail: an unavailable backend is an empty result.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Return up to roughly `limit` distinct URLs.
    async fn search_urls(&self, keywords: &[String], limit: u32) -> BTreeSet<String>;
}

// ---------------------------------------------------------------------------
// Google Custom Search
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    link: Option<String>,
}

/// Search client for the Google Custom Search JSON API.
pub struct GoogleSearchClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    engine_id: Option<String>,
    results_per_request: u32,
    query_suffix: String,
}

impl GoogleSearchClient {
    /// Build a client, reading credentials from the env vars named in `config`.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env);
        let engine_id = read_secret(&config.engine_id_env);
        if api_key.is_none() || engine_id.is_none() {
            warn!(
                key_env = %config.api_key_env,
                engine_env = %config.engine_id_env,
                "search credentials not set, searches will return nothing"
            );
        }
        Self::new(config, api_key, engine_id)
    }

    /// Build a client with explicit credentials.
    pub fn new(
        config: &SearchConfig,
        api_key: Option<String>,
        engine_id: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MeetNewsError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            engine_id,
            results_per_request: config.results_per_request,
            query_suffix: config.query_suffix.clone(),
        })
    }

    /// Fetch one result page and return its links.
    async fn fetch_page(
        &self,
        query: &str,
        page: PageRequest,
        api_key: &str,
        engine_id: &str,
    ) -> Result<Vec<String>> {
        let num = page.num.to_string();
        let start = page.start.to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", api_key),
                ("cx", engine_id),
                ("q", query),
                ("num", num.as_str()),
                ("start", start.as_str()),
                ("sort", "date"),
            ])
            .send()
            .await
            .map_err(|e| MeetNewsError::Network(format!("search page {}: {e}", page.start)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MeetNewsError::Network(format!(
                "search page {}: HTTP {status}",
                page.start
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| MeetNewsError::parse(format!("search page {}: {e}", page.start)))?;

        Ok(body.items.into_iter().filter_map(|i| i.link).collect())
    }
}

#[async_trait]
impl SearchClient for GoogleSearchClient {
    #[instrument(skip_all, fields(keywords = keywords.len(), limit = limit))]
    async fn search_urls(&self, keywords: &[String], limit: u32) -> BTreeSet<String> {
        let (Some(api_key), Some(engine_id)) = (self.api_key.as_deref(), self.engine_id.as_deref())
        else {
            debug!("search not configured");
            return BTreeSet::new();
        };

        let Some(query) = build_query(keywords, &self.query_suffix) else {
            debug!("no usable keywords");
            return BTreeSet::new();
        };

        let pages = plan_pages(limit, self.results_per_request);
        let outcomes = futures::future::join_all(
            pages
                .iter()
                .map(|page| self.fetch_page(&query, *page, api_key, engine_id)),
        )
        .await;

        let mut urls = BTreeSet::new();
        let mut failed = 0usize;
        for outcome in outcomes {
            match outcome {
                Ok(links) => urls.extend(links),
                Err(e) => {
                    failed += 1;
                    debug!(error = %e, "search page dropped");
                }
            }
        }

        info!(
            pages = pages.len(),
            failed,
            urls = urls.len(),
            "search completed"
        );
        urls
    }
}
