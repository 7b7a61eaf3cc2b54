//! Unsupervised clustering of linked edition records into editions.
//!
//! Consumes all records already asserted to belong to one work and
//! partitions them into editions: feature extraction, weighted
//! vectorization, automatic cluster-count selection, k-means assignment and
//! reduction of each cluster to a representative year-range label.

mod features;
mod kmeans;
mod select_k;
mod vectorize;

pub use features::{extract_row, normalize_text, FeatureRow};
pub use kmeans::{run_kmeans, silhouette_score, KMeansOutcome};
pub use select_k::{max_cluster_bound, select_cluster_count};
pub use vectorize::{build_matrix, feature_columns, ColumnKind, FeatureColumn};

use serde::Serialize;
use tracing::{info, warn};

use crate::dates::YearComponents;
use crate::record::BibRecord;

/// One resolved edition: a non-empty set of member record keys labeled by
/// the merged year range of its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditionCluster {
    /// Merged year-range display string, e.g. `"1900-1910"` or `"19xx"`.
    pub label: String,
    pub members: Vec<String>,
}

/// Clustering engine configuration.
pub struct ClusteringEngine {
    restarts: usize,
    max_iterations: usize,
}

impl Default for ClusteringEngine {
    fn default() -> Self {
        Self {
            restarts: 3,
            max_iterations: 100,
        }
    }
}

impl ClusteringEngine {
    /// Partition one work's edition records into editions.
    pub fn cluster_editions(&self, records: &[BibRecord]) -> Vec<EditionCluster> {
        if records.is_empty() {
            return Vec::new();
        }
        let rows: Vec<FeatureRow> = records.iter().map(extract_row).collect();

        // A single record forms its own edition without invoking k-means.
        if rows.len() == 1 {
            return reduce_clusters(&rows, &[0]);
        }

        let matrix = build_matrix(&rows);
        if matrix.iter().all(|row| row.is_empty()) {
            warn!(
                records = rows.len(),
                "no usable features, collapsing to one edition"
            );
            return reduce_clusters(&rows, &vec![0; rows.len()]);
        }

        let k = select_cluster_count(&matrix);
        let assignments = if k <= 1 {
            vec![0; rows.len()]
        } else {
            match run_kmeans(&matrix, k, self.restarts, self.max_iterations) {
                Some(outcome) => outcome.assignments,
                None => {
                    // Fewer distinct rows than clusters; one edition.
                    warn!(k, "clustering failed, collapsing to one edition");
                    vec![0; rows.len()]
                }
            }
        };

        let clusters = reduce_clusters(&rows, &assignments);
        info!(
            records = rows.len(),
            editions = clusters.len(),
            "clustered work editions"
        );
        clusters
    }
}

/// Reduce assigned rows to representative editions: group by cluster id,
/// merge member year components into one covering range label.
fn reduce_clusters(rows: &[FeatureRow], assignments: &[usize]) -> Vec<EditionCluster> {
    let mut by_cluster: std::collections::BTreeMap<usize, Vec<&FeatureRow>> =
        std::collections::BTreeMap::new();
    for (row, cluster) in rows.iter().zip(assignments.iter()) {
        by_cluster.entry(*cluster).or_default().push(row);
    }

    by_cluster
        .into_values()
        .map(|members| {
            let merged =
                YearComponents::merge(members.iter().map(|row| row.year_components));
            EditionCluster {
                label: merged.display(),
                members: members.iter().map(|row| row.key.clone()).collect(),
            }
        })
        .collect()
}
