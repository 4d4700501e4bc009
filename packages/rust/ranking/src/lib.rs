//! Semantic similarity ranking for MeetNews.
//!
//! [`RankingService`] orders candidate news items by cosine similarity
//! between their text and a meeting summary, keeping the best `top_k`.
//! The scoring model is created lazily, once per service, on first use;
//! a failed load is not remembered and the next call tries again.

pub mod embedder;
pub mod model;
pub mod pooling;
pub mod select;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use meetnews_shared::{CandidateItem, MeetNewsError, RankRequest, RankingConfig, Result};

pub use embedder::{HubModelLoader, SentenceEmbedder};
pub use model::{ModelLoader, ScoringModel};
pub use select::{cosine_similarity, top_k_indices};

/// Ranks candidates against a query text with a lazily loaded model.
pub struct RankingService {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn ScoringModel>>,
}

impl RankingService {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
        }
    }

    /// Service backed by the Hugging Face sentence-transformer in `config`.
    pub fn from_config(config: &RankingConfig) -> Self {
        Self::new(Arc::new(HubModelLoader::new(config.clone())))
    }

    /// Whether the model has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// The shared model, loading it on a blocking thread if needed.
    ///
    /// Concurrent first callers wait on the same load.
    async fn model(&self) -> Result<Arc<dyn ScoringModel>> {
        self.model
            .get_or_try_init(|| async {
                let loader = self.loader.clone();
                tokio::task::spawn_blocking(move || loader.load())
                    .await
                    .map_err(|e| MeetNewsError::Ranking(format!("model load task failed: {e}")))?
            })
            .await
            .cloned()
    }

    /// Rank `request.candidates` against `request.query_text`.
    ///
    /// Candidates without text are dropped first; if none remain the
    /// result is empty and the model is never touched. Equal scores keep
    /// fetch order.
    #[instrument(skip_all, fields(candidates = request.candidates.len(), top_k = request.top_k))]
    pub async fn rank(&self, request: RankRequest) -> Result<Vec<CandidateItem>> {
        let start = Instant::now();
        let RankRequest {
            query_text,
            candidates,
            top_k,
            ..
        } = request;

        let valid: Vec<CandidateItem> = candidates.into_iter().filter(|c| c.has_text()).collect();
        if valid.is_empty() {
            debug!("no candidates with text");
            return Ok(Vec::new());
        }

        let model = self.model().await?;

        let mut texts = Vec::with_capacity(valid.len() + 1);
        texts.push(query_text);
        texts.extend(valid.iter().map(|c| c.text_str().to_string()));
        let expected = texts.len();

        let embeddings = tokio::task::spawn_blocking(move || model.embed(&texts))
            .await
            .map_err(|e| MeetNewsError::Ranking(format!("embedding task failed: {e}")))??;

        if embeddings.len() != expected {
            return Err(MeetNewsError::Ranking(format!(
                "model returned {} vectors for {expected} texts",
                embeddings.len()
            )));
        }

        let (query, docs) = embeddings
            .split_first()
            .ok_or_else(|| MeetNewsError::Ranking("no query embedding".into()))?;
        let scores: Vec<f32> = docs.iter().map(|d| cosine_similarity(query, d)).collect();

        for (item, score) in valid.iter().zip(&scores) {
            debug!(url = %item.url, score, "candidate score");
        }

        let order = top_k_indices(&scores, top_k);
        let mut slots: Vec<Option<CandidateItem>> = valid.into_iter().map(Some).collect();
        let selected: Vec<CandidateItem> = order.iter().filter_map(|&i| slots[i].take()).collect();

        for (rank, (item, &i)) in selected.iter().zip(&order).enumerate() {
            debug!(rank = rank + 1, url = %item.url, score = scores[i], "selected");
        }
        info!(
            scored = scores.len(),
            selected = selected.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ranking completed"
        );
        Ok(selected)
    }
}
