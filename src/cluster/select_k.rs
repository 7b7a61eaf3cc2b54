//! Automatic cluster-count selection by silhouette bisection.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::kmeans::{run_kmeans, silhouette_score};

/// Restarts/iterations used while scoring candidate counts.
const SCORING_RESTARTS: usize = 2;
const SCORING_ITERATIONS: usize = 50;
/// Guard against oscillation between degenerate boundaries.
const MAX_BISECTION_STEPS: usize = 50;
/// Absolute ceiling on the candidate cluster count.
const HARD_CEILING: usize = 1000;

/// Upper bound on the candidate cluster count for a corpus of `n` records.
///
/// The bound scales down as the corpus grows to keep clustering cost
/// manageable, and never exceeds the hard ceiling or `n` itself.
pub fn max_cluster_bound(n: usize) -> usize {
    let cap = if n >= 5000 {
        n / 9
    } else if n >= 1000 {
        n * 2 / 9
    } else if n >= 500 {
        n * 3 / 9
    } else if n >= 250 {
        n * 4 / 9
    } else {
        n
    };
    cap.min(HARD_CEILING).min(n).max(1)
}

/// Silhouette score for clustering `points` into `k` groups; `None` marks a
/// degenerate count (not enough distinct rows, or a collapsed clustering).
fn score_k(points: &[Vec<f64>], k: usize, memo: &mut HashMap<usize, Option<f64>>) -> Option<f64> {
    if let Some(cached) = memo.get(&k) {
        return *cached;
    }
    let score = if k < 2 || k > points.len() {
        None
    } else {
        run_kmeans(points, k, SCORING_RESTARTS, SCORING_ITERATIONS)
            .filter(|outcome| outcome.populated_clusters == k)
            .and_then(|outcome| silhouette_score(points, &outcome.assignments))
    };
    memo.insert(k, score);
    score
}

/// Choose a cluster count in `[2, max_cluster_bound(n)]` by bisection on
/// silhouette score.
///
/// Degenerate endpoints collapse inward instead of erroring; visited bound
/// pairs and a step cap guarantee termination. Returns 1 when no non-trivial
/// clustering scores at all (e.g. all rows identical).
pub fn select_cluster_count(points: &[Vec<f64>]) -> usize {
    let n = points.len();
    if n <= 2 {
        return 1;
    }

    let mut start = 2usize;
    let mut stop = max_cluster_bound(n).max(2);
    let mut memo: HashMap<usize, Option<f64>> = HashMap::new();
    let mut visited: HashSet<(usize, usize)> = HashSet::new();

    for _ in 0..MAX_BISECTION_STEPS {
        if !visited.insert((start, stop)) {
            break;
        }
        // Collapse degenerate boundaries inward.
        while start < stop && score_k(points, start, &mut memo).is_none() {
            start += 1;
        }
        while stop > start && score_k(points, stop, &mut memo).is_none() {
            stop -= 1;
        }
        if stop - start <= 1 {
            break;
        }
        let start_score = score_k(points, start, &mut memo);
        let stop_score = score_k(points, stop, &mut memo);
        let mid = (start + stop) / 2;
        match (start_score, stop_score) {
            (Some(a), Some(b)) => {
                // The midpoint replaces the worse-scoring end.
                if a >= b {
                    stop = mid;
                } else {
                    start = mid;
                }
            }
            _ => break,
        }
    }

    let selected = [start, stop]
        .into_iter()
        .filter_map(|k| score_k(points, k, &mut memo).map(|s| (k, s)))
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, _)| k)
        .unwrap_or(1);
    debug!(n, selected, "cluster count selected");
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_cluster_bound_tiers() {
        assert_eq!(max_cluster_bound(100), 100);
        assert_eq!(max_cluster_bound(250), 111);
        assert_eq!(max_cluster_bound(500), 166);
        assert_eq!(max_cluster_bound(1000), 222);
        assert_eq!(max_cluster_bound(5000), 555);
        // The hard ceiling binds for very large corpora.
        assert_eq!(max_cluster_bound(20000), 1000);
        assert_eq!(max_cluster_bound(1), 1);
    }

    fn blob(center: f64, count: usize) -> Vec<Vec<f64>> {
        (0..count)
            .map(|i| vec![center + i as f64 * 0.01, center - i as f64 * 0.01])
            .collect()
    }

    #[test]
    fn test_selects_two_for_two_blobs() {
        let mut points = blob(0.0, 5);
        points.extend(blob(50.0, 5));
        assert_eq!(select_cluster_count(&points), 2);
    }

    #[test]
    fn test_selects_three_for_three_blobs() {
        let mut points = blob(0.0, 5);
        points.extend(blob(50.0, 5));
        points.extend(blob(200.0, 5));
        assert_eq!(select_cluster_count(&points), 3);
    }

    #[test]
    fn test_identical_rows_fall_back_to_one() {
        let points = vec![vec![1.0, 2.0]; 8];
        assert_eq!(select_cluster_count(&points), 1);
    }

    #[test]
    fn test_tiny_inputs_short_circuit() {
        assert_eq!(select_cluster_count(&[vec![1.0]]), 1);
        assert_eq!(select_cluster_count(&[vec![1.0], vec![2.0]]), 1);
    }

    #[test]
    fn test_degenerate_upper_bound_collapses() {
        // Only two distinct rows: every k above 2 is degenerate and the
        // upper boundary must collapse rather than error.
        let mut points = vec![vec![0.0]; 4];
        points.extend(vec![vec![9.0]; 4]);
        assert_eq!(select_cluster_count(&points), 2);
    }
}
