//! The news enrichment pipeline: search → fetch → rank → summarize → persist.
//!
//! Each stage either produces input for the next or ends the run with an
//! explicit outcome. Ranking is delegated to the dedicated queue and waited
//! on with a deadline; when it times out or fails, the first fetched items
//! are used instead. The pipeline never returns an error to its caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use meetnews_crawler::FetchClient;
use meetnews_search::SearchClient;
use meetnews_shared::{AppConfig, CandidateItem, ProcessNewsRequest, RankRequest, RankingMode};
use meetnews_storage::NewsSink;

use crate::broker::Dispatcher;
use crate::summarize::{Summarizer, summarize_items};

// ---------------------------------------------------------------------------
// Settings and outcomes
// ---------------------------------------------------------------------------

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Number of search results requested.
    pub search_limit: u32,
    /// Items kept by similarity ranking.
    pub top_k: usize,
    /// Items kept, in fetch order, when ranking is unavailable.
    pub fallback_count: usize,
    /// Deadline for the delegated ranking task.
    pub delegate_timeout: Duration,
    /// Summary stored for an item whose summarization failed.
    pub failure_placeholder: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            search_limit: config.search.result_count,
            top_k: config.ranking.top_k,
            fallback_count: config.ranking.fallback_count,
            delegate_timeout: Duration::from_secs(config.ranking.delegate_timeout_secs),
            failure_placeholder: config.summarize.failure_placeholder.clone(),
        }
    }
}

/// Result of the ranking stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RankingStage {
    /// Ordered by similarity to the summary.
    Ranked(Vec<CandidateItem>),
    /// Ranking was unavailable; first items in fetch order.
    Fallback {
        items: Vec<CandidateItem>,
        reason: String,
    },
}

impl RankingStage {
    pub fn mode(&self) -> RankingMode {
        match self {
            Self::Ranked(_) => RankingMode::Similarity,
            Self::Fallback { .. } => RankingMode::Fallback,
        }
    }

    pub fn into_items(self) -> Vec<CandidateItem> {
        match self {
            Self::Ranked(items) | Self::Fallback { items, .. } => items,
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Search found no candidate URLs.
    NoSourcesFound,
    /// No URL produced a usable article.
    NoContentFetched,
    /// All stages ran. `persisted` is false if the final write failed.
    Completed {
        items: Vec<CandidateItem>,
        ranking: RankingMode,
        persisted: bool,
    },
}

impl PipelineOutcome {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoSourcesFound => "no_sources_found",
            Self::NoContentFetched => "no_content_fetched",
            Self::Completed { .. } => "completed",
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the enrichment pipeline for one record at a time.
pub struct Orchestrator {
    search: Arc<dyn SearchClient>,
    fetch: Arc<dyn FetchClient>,
    summarizer: Arc<dyn Summarizer>,
    sink: Arc<dyn NewsSink>,
    dispatcher: Dispatcher,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        search: Arc<dyn SearchClient>,
        fetch: Arc<dyn FetchClient>,
        summarizer: Arc<dyn Summarizer>,
        sink: Arc<dyn NewsSink>,
        dispatcher: Dispatcher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            search,
            fetch,
            summarizer,
            sink,
            dispatcher,
            settings,
        }
    }

    /// Run all stages for `request`.
    #[instrument(skip_all, fields(record_id = request.record_id, owner_id = request.owner_id))]
    pub async fn run(&self, request: ProcessNewsRequest) -> PipelineOutcome {
        let start = Instant::now();
        info!(keywords = request.keywords.len(), "enrichment started");

        // --- Stage 1: Search ---
        let urls: Vec<String> = self
            .search
            .search_urls(&request.keywords, self.settings.search_limit)
            .await
            .into_iter()
            .collect();
        if urls.is_empty() {
            info!("no candidate sources found");
            return PipelineOutcome::NoSourcesFound;
        }
        info!(urls = urls.len(), "search stage done");

        // --- Stage 2: Fetch ---
        let fetched = self.fetch.fetch_articles(&urls).await;
        if fetched.is_empty() {
            info!("no article content fetched");
            return PipelineOutcome::NoContentFetched;
        }
        info!(items = fetched.len(), "fetch stage done");

        // --- Stage 3: Rank ---
        let stage = self.rank(&request.summary_text, fetched).await;
        let ranking = stage.mode();
        if let RankingStage::Fallback { reason, .. } = &stage {
            warn!(%reason, "ranking unavailable, using first fetched items");
        }
        let selected = stage.into_items();
        info!(selected = selected.len(), ranking = ranking.as_str(), "rank stage done");

        // --- Stage 4: Summarize ---
        let items = summarize_items(
            self.summarizer.as_ref(),
            selected,
            self.settings.failure_placeholder.as_deref(),
        )
        .await;

        // --- Stage 5: Persist ---
        let persisted = match self
            .sink
            .update_news_items(request.record_id, &items, ranking)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist news items");
                false
            }
        };

        info!(
            items = items.len(),
            ranking = ranking.as_str(),
            persisted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "enrichment completed"
        );

        PipelineOutcome::Completed {
            items,
            ranking,
            persisted,
        }
    }

    /// Delegate ranking and wait on it, falling back to fetch order.
    async fn rank(&self, query: &str, fetched: Vec<CandidateItem>) -> RankingStage {
        let fallback = |fetched: Vec<CandidateItem>, reason: String| RankingStage::Fallback {
            items: fetched
                .into_iter()
                .take(self.settings.fallback_count)
                .collect(),
            reason,
        };

        let request = RankRequest::new(query, fetched.clone(), self.settings.top_k);
        let handle = match self.dispatcher.delegate_rank(request) {
            Ok(handle) => handle,
            Err(e) => return fallback(fetched, e.to_string()),
        };

        info!(task_id = %handle.id(), "ranking delegated");
        match handle.wait(self.settings.delegate_timeout).await {
            Ok(ranked) => RankingStage::Ranked(ranked),
            Err(e) => fallback(fetched, e.to_string()),
        }
    }
}
