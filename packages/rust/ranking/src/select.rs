//! Scoring and top-K selection.

/// Cosine similarity of two vectors. Zero when either has zero length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Indices of the `top_k` highest scores, best first.
///
/// Equal scores keep their input order. Non-finite scores rank last.
pub fn top_k_indices(scores: &[f32], top_k: usize) -> Vec<usize> {
    let keys: Vec<f32> = scores
        .iter()
        .map(|&s| if s.is_finite() { s } else { f32::NEG_INFINITY })
        .collect();
    let mut order: Vec<usize> = (0..keys.len()).collect();
    // sort_by is stable
    order.sort_by(|&a, &b| keys[b].total_cmp(&keys[a]));
    order.truncate(top_k);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn top_k_orders_descending() {
        let scores = [0.1, 0.9, 0.5, 0.7];
        assert_eq!(top_k_indices(&scores, 3), vec![1, 3, 2]);
    }

    #[test]
    fn ties_keep_input_order() {
        let scores = [0.5, 0.8, 0.5, 0.8, 0.5];
        assert_eq!(top_k_indices(&scores, 5), vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn non_finite_scores_rank_last() {
        let scores = [0.2, f32::NAN, -0.4, f32::INFINITY, 0.6];
        assert_eq!(top_k_indices(&scores, 3), vec![4, 0, 2]);
        assert_eq!(top_k_indices(&scores, 5)[3..], [1, 3]);
    }

    #[test]
    fn top_k_larger_than_input() {
        assert_eq!(top_k_indices(&[0.3, 0.6], 5), vec![1, 0]);
        assert!(top_k_indices(&[], 5).is_empty());
        assert!(top_k_indices(&[0.3], 0).is_empty());
    }
}
