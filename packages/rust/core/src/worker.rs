//! Task execution and wiring of the production pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use meetnews_crawler::ArticleFetcher;
use meetnews_ranking::RankingService;
use meetnews_search::GoogleSearchClient;
use meetnews_shared::{AppConfig, Result};
use meetnews_storage::Storage;

use crate::broker::{Broker, PoolSizes, Task, TaskContext, TaskExecutor};
use crate::pipeline::{Orchestrator, PipelineSettings};
use crate::router::Router;
use crate::summarize::GeminiSummarizer;

/// Executes broker tasks: orchestrator runs and ranking requests.
pub struct NewsWorker {
    orchestrator: Arc<Orchestrator>,
    ranking: Arc<RankingService>,
}

impl NewsWorker {
    pub fn new(orchestrator: Arc<Orchestrator>, ranking: Arc<RankingService>) -> Self {
        Self {
            orchestrator,
            ranking,
        }
    }
}

#[async_trait]
impl TaskExecutor for NewsWorker {
    #[instrument(skip_all, fields(task_id = %ctx.id, queue = %ctx.queue))]
    async fn execute(&self, ctx: TaskContext, task: Task) {
        match task {
            Task::ProcessNews(request) => {
                let record_id = request.record_id;
                let outcome = self.orchestrator.run(request).await;
                info!(record_id, outcome = outcome.label(), "process_news finished");
            }
            Task::RankSimilarity { request, reply } => {
                let result = self.ranking.rank(request).await;
                if reply.send(result).is_err() {
                    debug!("ranking result discarded, waiter gone");
                }
            }
        }
    }
}

/// Build every pipeline component from `config` and start the broker.
///
/// The scoring model is not loaded here; the first ranking task loads it.
pub fn start_broker(config: &AppConfig, storage: Arc<Storage>) -> Result<Broker> {
    let router = Router::from_config(&config.queues.routes)?;
    let search = Arc::new(GoogleSearchClient::from_config(&config.search)?);
    let fetch = Arc::new(ArticleFetcher::new(&config.fetch)?);
    let summarizer = Arc::new(GeminiSummarizer::from_config(&config.summarize)?);
    let ranking = Arc::new(RankingService::from_config(&config.ranking));
    let settings = PipelineSettings::from_config(config);

    Ok(Broker::start(
        router,
        PoolSizes::from(&config.queues),
        move |dispatcher| {
            let orchestrator = Arc::new(Orchestrator::new(
                search, fetch, summarizer, storage, dispatcher, settings,
            ));
            let worker: Arc<dyn TaskExecutor> = Arc::new(NewsWorker::new(orchestrator, ranking));
            worker
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use meetnews_crawler::FetchClient;
    use meetnews_ranking::{ModelLoader, ScoringModel};
    use meetnews_search::SearchClient;
    use meetnews_shared::{CandidateItem, ProcessNewsRequest, RankingMode};
    use meetnews_storage::NewsSink;

    use crate::summarize::Summarizer;

    struct StaticSearch;

    #[async_trait]
    impl SearchClient for StaticSearch {
        async fn search_urls(&self, _keywords: &[String], _limit: u32) -> BTreeSet<String> {
            ["https://a.example/1", "https://b.example/2", "https://c.example/3"]
                .into_iter()
                .map(String::from)
                .collect()
        }
    }

    /// Body text is a 2-d vector the fake model reads back.
    struct VectorFetch;

    #[async_trait]
    impl FetchClient for VectorFetch {
        async fn fetch_articles(&self, urls: &[String]) -> Vec<CandidateItem> {
            let bodies = ["0,1", "1,0", "1,1"];
            urls.iter()
                .zip(bodies)
                .map(|(u, b)| CandidateItem::new(u.as_str(), "headline", b))
                .collect()
        }
    }

    struct ParseModel;

    impl ScoringModel for ParseModel {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| t.split(',').filter_map(|x| x.parse().ok()).collect())
                .collect())
        }
    }

    struct ParseLoader;

    impl ModelLoader for ParseLoader {
        fn load(&self) -> Result<Arc<dyn ScoringModel>> {
            Ok(Arc::new(ParseModel))
        }
    }

    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(&self, text: &str) -> Result<String> {
            Ok(format!("about {text}"))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        writes: Mutex<Vec<(i64, Vec<CandidateItem>, RankingMode)>>,
    }

    #[async_trait]
    impl NewsSink for MemorySink {
        async fn update_news_items(
            &self,
            record_id: i64,
            items: &[CandidateItem],
            ranking: RankingMode,
        ) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((record_id, items.to_vec(), ranking));
            Ok(())
        }
    }

    #[tokio::test]
    async fn enqueued_record_is_ranked_across_pools_and_stored() {
        let sink = Arc::new(MemorySink::default());
        let ranking = Arc::new(RankingService::new(Arc::new(ParseLoader)));
        let settings = PipelineSettings {
            top_k: 2,
            delegate_timeout: Duration::from_secs(10),
            ..PipelineSettings::default()
        };

        let sink_for_pipeline = sink.clone();
        let ranking_for_worker = ranking.clone();
        let broker = Broker::start(
            Router::default(),
            PoolSizes {
                default: 2,
                dedicated: 1,
            },
            move |dispatcher| {
                let orchestrator = Arc::new(Orchestrator::new(
                    Arc::new(StaticSearch),
                    Arc::new(VectorFetch),
                    Arc::new(EchoSummarizer),
                    sink_for_pipeline,
                    dispatcher,
                    settings,
                ));
                let worker: Arc<dyn TaskExecutor> =
                    Arc::new(NewsWorker::new(orchestrator, ranking_for_worker));
                worker
            },
        );

        broker
            .dispatcher()
            .enqueue_process_news(ProcessNewsRequest::new(
                11,
                3,
                "1,0",
                vec!["semiconductors".into()],
            ))
            .unwrap();
        broker.shutdown().await;

        let writes = sink.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        let (record_id, items, mode) = &writes[0];
        assert_eq!(*record_id, 11);
        assert_eq!(*mode, RankingMode::Similarity);
        let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://b.example/2", "https://c.example/3"]);
        assert_eq!(items[0].summary.as_deref(), Some("about 1,0"));
        assert!(ranking.is_loaded());
    }
}
