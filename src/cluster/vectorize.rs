//! Weighted vectorization of feature rows.
//!
//! Each feature column is an explicit descriptor with its own data
//! predicate and encoding: text columns become character n-gram count
//! blocks, the date column a sparse component-value block. Columns with no
//! data across the row set are pruned before encoding (an all-empty column
//! is zero-variance and would only degrade the distance geometry). Blocks
//! are concatenated with fixed weights; dates are weighted above text as
//! the strongest signal separating editions of one work.

use std::collections::BTreeSet;

use super::features::FeatureRow;

/// Weight applied to each retained text column.
const TEXT_WEIGHT: f64 = 1.0;
/// Weight applied to the date-component column.
const DATE_WEIGHT: f64 = 1.75;

/// How a column encodes its values.
pub enum ColumnKind {
    /// Character n-gram counts over the accessed text.
    Text {
        ngram_min: usize,
        ngram_max: usize,
        get: fn(&FeatureRow) -> &str,
    },
    /// Sparse date components keyed by name.
    DateComponents,
}

/// One enumerated feature column.
pub struct FeatureColumn {
    pub name: &'static str,
    pub weight: f64,
    pub kind: ColumnKind,
}

impl FeatureColumn {
    /// Whether any row carries a value for this column.
    pub fn has_data(&self, rows: &[FeatureRow]) -> bool {
        match &self.kind {
            ColumnKind::Text { get, .. } => rows.iter().any(|row| !get(row).is_empty()),
            ColumnKind::DateComponents => {
                rows.iter().any(|row| !row.year_components.is_empty())
            }
        }
    }

    /// Encode this column for every row; blocks are aligned by a shared
    /// vocabulary built across the row set.
    fn encode(&self, rows: &[FeatureRow]) -> Vec<Vec<f64>> {
        match &self.kind {
            ColumnKind::Text {
                ngram_min,
                ngram_max,
                get,
            } => {
                let vocabulary: BTreeSet<String> = rows
                    .iter()
                    .flat_map(|row| char_ngrams(get(row), *ngram_min, *ngram_max))
                    .collect();
                rows.iter()
                    .map(|row| {
                        let grams = char_ngrams(get(row), *ngram_min, *ngram_max);
                        vocabulary
                            .iter()
                            .map(|v| {
                                let count = grams.iter().filter(|g| *g == v).count();
                                count as f64 * self.weight
                            })
                            .collect()
                    })
                    .collect()
            }
            ColumnKind::DateComponents => {
                let vocabulary: BTreeSet<&'static str> = rows
                    .iter()
                    .flat_map(|row| {
                        row.year_components
                            .feature_components()
                            .into_iter()
                            .map(|(name, _)| name)
                    })
                    .collect();
                rows.iter()
                    .map(|row| {
                        let components = row.year_components.feature_components();
                        vocabulary
                            .iter()
                            .map(|name| {
                                components
                                    .iter()
                                    .find(|(n, _)| n == name)
                                    .map(|(_, value)| value * self.weight)
                                    .unwrap_or(0.0)
                            })
                            .collect()
                    })
                    .collect()
            }
        }
    }
}

/// The enumerated feature columns, in concatenation order.
pub fn feature_columns() -> Vec<FeatureColumn> {
    vec![
        FeatureColumn {
            name: "place",
            weight: TEXT_WEIGHT,
            kind: ColumnKind::Text {
                ngram_min: 2,
                ngram_max: 4,
                get: |row| &row.place,
            },
        },
        FeatureColumn {
            name: "publisher",
            weight: TEXT_WEIGHT,
            kind: ColumnKind::Text {
                ngram_min: 2,
                ngram_max: 4,
                get: |row| &row.publisher,
            },
        },
        FeatureColumn {
            name: "edition",
            weight: TEXT_WEIGHT,
            kind: ColumnKind::Text {
                ngram_min: 1,
                ngram_max: 3,
                get: |row| &row.edition_statement,
            },
        },
        FeatureColumn {
            name: "dates",
            weight: DATE_WEIGHT,
            kind: ColumnKind::DateComponents,
        },
    ]
}

fn char_ngrams(text: &str, min: usize, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut grams = Vec::new();
    for n in min..=max {
        if chars.len() < n {
            continue;
        }
        for window in chars.windows(n) {
            grams.push(window.iter().collect());
        }
    }
    grams
}

/// Build the dense feature matrix: retained column blocks concatenated per
/// row. Rows come back empty when no column has data.
pub fn build_matrix(rows: &[FeatureRow]) -> Vec<Vec<f64>> {
    let columns: Vec<FeatureColumn> = feature_columns()
        .into_iter()
        .filter(|column| column.has_data(rows))
        .collect();

    let mut matrix = vec![Vec::new(); rows.len()];
    for column in &columns {
        for (row_vector, block) in matrix.iter_mut().zip(column.encode(rows)) {
            row_vector.extend(block);
        }
    }
    matrix
}
