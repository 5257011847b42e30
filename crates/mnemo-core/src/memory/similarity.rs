//! Similarity scoring and ranking.
//!
//! The vector index reports cosine *distance*; callers reason in cosine
//! *similarity* (`1 - distance`). Ranking keeps only results strictly above
//! the threshold, orders them best first and caps the list at `k`.

use std::cmp::Ordering;

use mnemo_types::thread::ThreadId;
use mnemo_types::turn::SimilarityResult;

/// Default minimum similarity for a recalled turn (exclusive).
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;

/// Convert a cosine distance into a similarity score.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
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

/// Filter and order raw index candidates.
///
/// - drops rows that belong to another thread,
/// - keeps `similarity > threshold` (strict; non-finite scores are dropped),
/// - sorts descending, newer turn first on ties,
/// - truncates to `k` (`k == 0` yields an empty list).
pub fn rank_matches(
    candidates: Vec<SimilarityResult>,
    thread_id: &ThreadId,
    threshold: f32,
    k: usize,
) -> Vec<SimilarityResult> {
    if k == 0 {
        return Vec::new();
    }

    let mut matches: Vec<SimilarityResult> = candidates
        .into_iter()
        .filter(|c| &c.thread_id == thread_id)
        .filter(|c| c.similarity.is_finite() && c.similarity > threshold)
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.turn_id.cmp(&a.turn_id))
    });
    matches.truncate(k);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(thread: &str, turn_id: i64, similarity: f32) -> SimilarityResult {
        SimilarityResult {
            turn_id,
            thread_id: ThreadId::new(thread).unwrap(),
            content: format!("turn {turn_id}"),
            similarity,
        }
    }

    fn thread() -> ThreadId {
        ThreadId::new("t1").unwrap()
    }

    #[test]
    fn test_similarity_from_distance() {
        assert!((similarity_from_distance(0.0) - 1.0).abs() < 1e-6);
        assert!((similarity_from_distance(0.4) - 0.6).abs() < 1e-6);
        assert!((similarity_from_distance(1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let ranked = rank_matches(
            vec![
                candidate("t1", 1, 0.55),
                candidate("t1", 2, 0.61),
                candidate("t1", 3, 0.6),
            ],
            &thread(),
            DEFAULT_SIMILARITY_THRESHOLD,
            10,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].turn_id, 2);
    }

    #[test]
    fn test_sorted_descending_and_capped() {
        let ranked = rank_matches(
            vec![
                candidate("t1", 1, 0.7),
                candidate("t1", 2, 0.95),
                candidate("t1", 3, 0.8),
                candidate("t1", 4, 0.9),
            ],
            &thread(),
            0.6,
            3,
        );
        let ids: Vec<i64> = ranked.iter().map(|r| r.turn_id).collect();
        assert_eq!(ids, vec![2, 4, 3]);
    }

    #[test]
    fn test_ties_prefer_newer_turn() {
        let ranked = rank_matches(
            vec![candidate("t1", 3, 0.8), candidate("t1", 9, 0.8)],
            &thread(),
            0.6,
            2,
        );
        assert_eq!(ranked[0].turn_id, 9);
        assert_eq!(ranked[1].turn_id, 3);
    }

    #[test]
    fn test_foreign_thread_rows_are_dropped() {
        let ranked = rank_matches(
            vec![candidate("t2", 1, 0.99), candidate("t1", 2, 0.7)],
            &thread(),
            0.6,
            5,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].thread_id, thread());
    }

    #[test]
    fn test_zero_k_and_nan() {
        assert!(rank_matches(vec![candidate("t1", 1, 0.9)], &thread(), 0.6, 0).is_empty());
        assert!(rank_matches(vec![candidate("t1", 1, f32::NAN)], &thread(), 0.6, 3).is_empty());
    }
}
