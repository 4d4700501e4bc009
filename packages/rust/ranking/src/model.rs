//! Scoring model seams.

use std::sync::Arc;

use meetnews_shared::Result;

/// Maps texts to fixed-size embedding vectors.
///
/// Calls are blocking and CPU/GPU bound.
pub trait ScoringModel: Send + Sync {
    /// One vector per input text, index-aligned.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Produces the scoring model on first use. Blocking.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn ScoringModel>>;
}
