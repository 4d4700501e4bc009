//! Sentence pooling over BERT token embeddings.

use candle_core::Tensor;

/// Mean of token embeddings, ignoring padding.
///
/// `embeddings` is `(batch, seq_len, hidden)`, `attention_mask` is
/// `(batch, seq_len)` in `f32`. Returns `(batch, hidden)`.
pub fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.unsqueeze(2)?;
    let summed = embeddings.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9f32, f32::MAX)?;
    summed.broadcast_div(&counts)
}

/// Scale each row to unit length.
pub fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norms = embeddings.sqr()?.sum_keepdim(1)?.sqrt()?;
    embeddings.broadcast_div(&norms.clamp(1e-9f32, f32::MAX)?)
}
