//! K-means with k-means++ seeding, plus silhouette scoring.
//!
//! Small dense matrices only: the corpus is all editions of a single work,
//! bounded upstream by the cluster-count heuristic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Result of one k-means run.
#[derive(Debug, Clone)]
pub struct KMeansOutcome {
    /// Cluster id per input point, aligned with the input order.
    pub assignments: Vec<usize>,
    /// Number of clusters that actually received members.
    pub populated_clusters: usize,
}

fn distance_squared(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    distance_squared(a, b).sqrt()
}

fn count_distinct(points: &[Vec<f64>]) -> usize {
    let mut distinct: Vec<&Vec<f64>> = Vec::new();
    for point in points {
        if !distinct.iter().any(|d| *d == point) {
            distinct.push(point);
        }
    }
    distinct.len()
}

/// k-means++ seeding: the first centroid uniform, each further centroid
/// sampled proportionally to squared distance from the nearest chosen one.
fn seed_centroids(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| distance_squared(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total == 0.0 {
            // Fewer distinct points than requested centroids.
            centroids.push(points[rng.random_range(0..points.len())].clone());
            continue;
        }
        let mut threshold = rng.random::<f64>() * total;
        let mut chosen = points.len() - 1;
        for (index, weight) in weights.iter().enumerate() {
            threshold -= weight;
            if threshold <= 0.0 {
                chosen = index;
                break;
            }
        }
        centroids.push(points[chosen].clone());
    }
    centroids
}

fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    points
        .iter()
        .map(|p| {
            centroids
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    distance_squared(p, a)
                        .partial_cmp(&distance_squared(p, b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(index, _)| index)
                .unwrap_or(0)
        })
        .collect()
}

fn recompute_centroids(
    points: &[Vec<f64>],
    assignments: &[usize],
    centroids: &mut [Vec<f64>],
) {
    let dim = points[0].len();
    for (cluster, centroid) in centroids.iter_mut().enumerate() {
        let members: Vec<&Vec<f64>> = points
            .iter()
            .zip(assignments.iter())
            .filter(|(_, a)| **a == cluster)
            .map(|(p, _)| p)
            .collect();
        if members.is_empty() {
            continue;
        }
        let mut mean = vec![0.0; dim];
        for member in &members {
            for (m, v) in mean.iter_mut().zip(member.iter()) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= members.len() as f64;
        }
        *centroid = mean;
    }
}

fn within_cluster_sum(points: &[Vec<f64>], assignments: &[usize], centroids: &[Vec<f64>]) -> f64 {
    points
        .iter()
        .zip(assignments.iter())
        .map(|(p, a)| distance_squared(p, &centroids[*a]))
        .sum()
}

/// Run k-means over the points.
///
/// Returns `None` when the input has fewer distinct rows than `k`; the best
/// of `restarts` seeded runs is kept otherwise. Deterministic for a given
/// input (restart index seeds the generator).
pub fn run_kmeans(
    points: &[Vec<f64>],
    k: usize,
    restarts: usize,
    max_iterations: usize,
) -> Option<KMeansOutcome> {
    if points.is_empty() || k == 0 || k > points.len() {
        return None;
    }
    if count_distinct(points) < k {
        return None;
    }

    let mut best: Option<(f64, Vec<usize>)> = None;
    for restart in 0..restarts.max(1) {
        let mut rng = StdRng::seed_from_u64(restart as u64);
        let mut centroids = seed_centroids(points, k, &mut rng);
        let mut assignments = assign(points, &centroids);
        for _ in 0..max_iterations {
            recompute_centroids(points, &assignments, &mut centroids);
            let next = assign(points, &centroids);
            if next == assignments {
                break;
            }
            assignments = next;
        }
        let cost = within_cluster_sum(points, &assignments, &centroids);
        if best.as_ref().map(|(c, _)| cost < *c).unwrap_or(true) {
            best = Some((cost, assignments));
        }
    }

    let (_, assignments) = best?;
    let mut seen = vec![false; k];
    for a in &assignments {
        seen[*a] = true;
    }
    let populated_clusters = seen.iter().filter(|s| **s).count();
    Some(KMeansOutcome {
        assignments,
        populated_clusters,
    })
}

/// Mean silhouette coefficient over all points, in [-1, 1].
///
/// Singleton clusters score zero for their point. Returns `None` when fewer
/// than two clusters are populated.
pub fn silhouette_score(points: &[Vec<f64>], assignments: &[usize]) -> Option<f64> {
    let cluster_ids: std::collections::BTreeSet<usize> = assignments.iter().copied().collect();
    if cluster_ids.len() < 2 || points.len() != assignments.len() {
        return None;
    }

    let mut total = 0.0;
    for (i, point) in points.iter().enumerate() {
        let own = assignments[i];
        let own_size = assignments.iter().filter(|a| **a == own).count();
        if own_size == 1 {
            continue; // contributes 0
        }

        let mut intra = 0.0;
        for (j, other) in points.iter().enumerate() {
            if i != j && assignments[j] == own {
                intra += distance(point, other);
            }
        }
        let a = intra / (own_size - 1) as f64;

        let mut b = f64::INFINITY;
        for cluster in &cluster_ids {
            if *cluster == own {
                continue;
            }
            let mut sum = 0.0;
            let mut count = 0usize;
            for (j, other) in points.iter().enumerate() {
                if assignments[j] == *cluster {
                    sum += distance(point, other);
                    count += 1;
                }
            }
            if count > 0 {
                b = b.min(sum / count as f64);
            }
        }

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    Some(total / points.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.1],
            vec![0.1, 0.0],
            vec![0.05, 0.05],
            vec![10.0, 10.1],
            vec![10.1, 10.0],
            vec![10.05, 9.95],
        ]
    }

    #[test]
    fn test_kmeans_separates_two_blobs() {
        let points = two_blobs();
        let outcome = run_kmeans(&points, 2, 3, 100).unwrap();
        assert_eq!(outcome.populated_clusters, 2);
        let first = outcome.assignments[0];
        assert!(outcome.assignments[..3].iter().all(|a| *a == first));
        assert!(outcome.assignments[3..].iter().all(|a| *a != first));
    }

    #[test]
    fn test_kmeans_rejects_k_above_distinct_rows() {
        let points = vec![vec![1.0], vec![1.0], vec![2.0]];
        assert!(run_kmeans(&points, 3, 3, 100).is_none());
        assert!(run_kmeans(&points, 2, 3, 100).is_some());
    }

    #[test]
    fn test_kmeans_rejects_degenerate_inputs() {
        assert!(run_kmeans(&[], 1, 3, 100).is_none());
        let points = vec![vec![1.0]];
        assert!(run_kmeans(&points, 2, 3, 100).is_none());
    }

    #[test]
    fn test_silhouette_high_for_clean_split() {
        let points = two_blobs();
        let assignments = vec![0, 0, 0, 1, 1, 1];
        let score = silhouette_score(&points, &assignments).unwrap();
        assert!(score > 0.9, "expected near-perfect score, got {score}");
    }

    #[test]
    fn test_silhouette_low_for_bad_split() {
        let points = two_blobs();
        // Splitting across the natural blobs should score poorly.
        let assignments = vec![0, 1, 0, 1, 0, 1];
        let score = silhouette_score(&points, &assignments).unwrap();
        assert!(score < 0.2, "expected poor score, got {score}");
    }

    #[test]
    fn test_silhouette_requires_two_clusters() {
        let points = two_blobs();
        assert!(silhouette_score(&points, &[0, 0, 0, 0, 0, 0]).is_none());
    }
}
