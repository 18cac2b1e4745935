// Clustering engine: standardize, search the cluster count, fit

use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use matchup_models::{ClusterCentroids, FeatureScaler, FeatureVector, KScore, MatchupError, FEATURE_COUNT};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::scaler::{standardize, to_matrix, total_sum_of_squares};
use crate::selection::{ClusterCountPolicy, MaxPseudoR2};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub k_min: usize,
    pub k_max: usize,
    pub seed: u64,
    pub max_iterations: u64,
    pub n_runs: usize,
    pub tolerance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 6,
            seed: 42,
            max_iterations: 300,
            n_runs: 10,
            tolerance: 1e-4,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    #[error("{available} matches available, at least {required} needed")]
    InsufficientData { available: usize, required: usize },

    #[error("degenerate matchup history: {reason}")]
    Degenerate { reason: String },

    #[error("k-means failed for k={k}: {reason}")]
    Fit { k: usize, reason: String },

    #[error("invalid clustering configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl From<ClusteringError> for MatchupError {
    fn from(err: ClusteringError) -> Self {
        match err {
            ClusteringError::InsufficientData { .. } => MatchupError::insufficient(err.to_string()),
            _ => MatchupError::numerical(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusteringOutcome {
    pub scaler: FeatureScaler,
    pub centroids: ClusterCentroids,
    /// Cluster id per input vector, dense in `0..chosen_k`.
    pub labels: Vec<usize>,
    pub chosen_k: usize,
    pub scores: Vec<KScore>,
    pub policy: &'static str,
}

struct KFit {
    k: usize,
    labels: Vec<usize>,
    centroids: Array2<f64>,
    sse: f64,
}

pub struct ClusteringEngine {
    config: ClusteringConfig,
    policy: Box<dyn ClusterCountPolicy>,
}

impl ClusteringEngine {
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            policy: Box::new(MaxPseudoR2),
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn ClusterCountPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Standardizes `vectors`, scores every candidate `k` and keeps the fit the
    /// policy selects. A `hint` skips the search and fits exactly that many clusters.
    pub fn fit(&self, vectors: &[FeatureVector], hint: Option<usize>) -> Result<ClusteringOutcome, ClusteringError> {
        let (lower, upper) = self.candidate_range(hint)?;

        let n = vectors.len();
        if n < lower {
            return Err(ClusteringError::InsufficientData {
                available: n,
                required: lower,
            });
        }

        let matrix = to_matrix(vectors);
        let (scaler, scaled) = standardize(&matrix).map_err(|e| ClusteringError::Degenerate {
            reason: format!("standardization failed: {e}"),
        })?;

        let sst = total_sum_of_squares(&scaled);
        if !sst.is_finite() || sst <= f64::EPSILON {
            return Err(ClusteringError::Degenerate {
                reason: "all matches have identical statistics".to_string(),
            });
        }

        let distinct = distinct_rows(&matrix);
        if distinct < lower {
            return Err(ClusteringError::Degenerate {
                reason: format!("only {distinct} distinct matches for at least {lower} clusters"),
            });
        }
        let upper = upper.min(distinct);

        let mut fits = Vec::with_capacity(upper - lower + 1);
        let mut scores = Vec::with_capacity(upper - lower + 1);
        for k in lower..=upper {
            let fit = self.fit_k(&scaled, k)?;
            let pseudo_r2 = 1.0 - fit.sse / sst;
            debug!(k, sse = fit.sse, pseudo_r2, "📐 scored cluster count");
            scores.push(KScore { k, sse: fit.sse, pseudo_r2 });
            fits.push(fit);
        }

        let chosen = match hint {
            Some(k) => k,
            None => self.policy.select(&scores).ok_or_else(|| ClusteringError::Degenerate {
                reason: "no cluster count produced a finite score".to_string(),
            })?,
        };

        // Seeded fits are reproducible, so the search fit at `chosen` is the final model.
        let fit = fits
            .into_iter()
            .find(|f| f.k == chosen)
            .ok_or_else(|| ClusteringError::Degenerate {
                reason: format!("policy chose k={chosen} outside the searched range"),
            })?;

        let (labels, centroids) = compact_clusters(fit.labels, &fit.centroids);
        if centroids.len() < chosen {
            warn!(requested = chosen, kept = centroids.len(), "⚠️ dropped empty clusters");
        }

        Ok(ClusteringOutcome {
            scaler,
            chosen_k: centroids.len(),
            centroids: ClusterCentroids { centers: centroids },
            labels,
            scores,
            policy: if hint.is_some() { "fixed_hint" } else { self.policy.name() },
        })
    }

    fn candidate_range(&self, hint: Option<usize>) -> Result<(usize, usize), ClusteringError> {
        match hint {
            Some(0) => Err(ClusteringError::InvalidConfig {
                reason: "cluster count hint must be at least 1".to_string(),
            }),
            Some(k) => Ok((k, k)),
            None if self.config.k_min == 0 || self.config.k_min > self.config.k_max => {
                Err(ClusteringError::InvalidConfig {
                    reason: format!("k range {}..={} is empty", self.config.k_min, self.config.k_max),
                })
            }
            None => Ok((self.config.k_min, self.config.k_max)),
        }
    }

    fn fit_k(&self, scaled: &Array2<f64>, k: usize) -> Result<KFit, ClusteringError> {
        let dataset = DatasetBase::from(scaled.clone());
        let rng = StdRng::seed_from_u64(self.config.seed);

        let model = KMeans::params_with_rng(k, rng)
            .max_n_iterations(self.config.max_iterations)
            .n_runs(self.config.n_runs)
            .tolerance(self.config.tolerance)
            .fit(&dataset)
            .map_err(|e| ClusteringError::Fit { k, reason: e.to_string() })?;

        let assigned: Array1<usize> = model.predict(scaled);
        let centroids = model.centroids().to_owned();

        if centroids.iter().any(|v| !v.is_finite()) {
            return Err(ClusteringError::Fit {
                k,
                reason: "non-finite centroid".to_string(),
            });
        }

        let labels = assigned.to_vec();
        let sse = within_cluster_sse(scaled, &labels, &centroids);
        Ok(KFit { k, labels, centroids, sse })
    }
}

fn within_cluster_sse(scaled: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    scaled
        .axis_iter(Axis(0))
        .zip(labels)
        .map(|(row, &label)| {
            row.iter()
                .zip(centroids.row(label).iter())
                .map(|(x, c)| (x - c) * (x - c))
                .sum::<f64>()
        })
        .sum()
}

fn distinct_rows(matrix: &Array2<f64>) -> usize {
    let mut rows: Vec<Vec<u64>> = matrix
        .axis_iter(Axis(0))
        .map(|row| row.iter().map(|v| v.to_bits()).collect())
        .collect();
    rows.sort_unstable();
    rows.dedup();
    rows.len()
}

/// Drops clusters that ended up with no members and renumbers the rest densely.
fn compact_clusters(labels: Vec<usize>, centroids: &Array2<f64>) -> (Vec<usize>, Vec<[f64; FEATURE_COUNT]>) {
    let k = centroids.nrows();
    let mut counts = vec![0usize; k];
    for &label in &labels {
        counts[label] += 1;
    }

    let mut remap = vec![usize::MAX; k];
    let mut kept = Vec::with_capacity(k);
    for (old, row) in centroids.axis_iter(Axis(0)).enumerate() {
        if counts[old] == 0 {
            continue;
        }
        remap[old] = kept.len();
        let mut center = [0.0; FEATURE_COUNT];
        for (cell, value) in center.iter_mut().zip(row.iter()) {
            *cell = *value;
        }
        kept.push(center);
    }

    let labels = labels.into_iter().map(|l| remap[l]).collect();
    (labels, kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchup_models::Feature;

    fn blob(home: f64, away: f64, jitter: f64) -> FeatureVector {
        FeatureVector::zeros()
            .with(Feature::HomeGoals, home + jitter)
            .with(Feature::AwayGoals, away - jitter)
            .with(Feature::HomeShots, 10.0 + home * 2.0 + jitter)
            .with(Feature::AwayShots, 8.0 + away * 2.0)
    }

    fn two_blobs() -> Vec<FeatureVector> {
        let mut vectors = Vec::new();
        for i in 0..6 {
            vectors.push(blob(4.0, 0.0, f64::from(i) * 0.05));
            vectors.push(blob(0.0, 3.0, f64::from(i) * 0.05));
        }
        vectors
    }

    #[test]
    fn test_hint_fits_exact_count_and_separates_blobs() {
        let engine = ClusteringEngine::new(ClusteringConfig::default());
        let outcome = engine.fit(&two_blobs(), Some(2)).unwrap();

        assert_eq!(outcome.chosen_k, 2);
        assert_eq!(outcome.policy, "fixed_hint");
        assert_eq!(outcome.labels.len(), 12);
        // Even rows are home blowouts, odd rows away wins.
        let home_label = outcome.labels[0];
        for (i, label) in outcome.labels.iter().enumerate() {
            assert_eq!(*label == home_label, i % 2 == 0);
        }
    }

    #[test]
    fn test_search_records_every_candidate() {
        let config = ClusteringConfig {
            k_min: 2,
            k_max: 4,
            ..ClusteringConfig::default()
        };
        let outcome = ClusteringEngine::new(config).fit(&two_blobs(), None).unwrap();
        let ks: Vec<usize> = outcome.scores.iter().map(|s| s.k).collect();
        assert_eq!(ks, vec![2, 3, 4]);
        assert!(outcome.scores.iter().all(|s| s.pseudo_r2 <= 1.0 + 1e-9));
        assert!((2..=4).contains(&outcome.chosen_k));
        assert_eq!(outcome.policy, "max_pseudo_r2");
    }

    #[test]
    fn test_too_few_matches() {
        let engine = ClusteringEngine::new(ClusteringConfig::default());
        let err = engine.fit(&[blob(1.0, 1.0, 0.0)], None).unwrap_err();
        assert_eq!(
            err,
            ClusteringError::InsufficientData {
                available: 1,
                required: 2
            }
        );
        assert!(matches!(MatchupError::from(err), MatchupError::InsufficientData { .. }));
    }

    #[test]
    fn test_identical_matches_are_degenerate() {
        let engine = ClusteringEngine::new(ClusteringConfig::default());
        let vectors = vec![blob(1.0, 1.0, 0.0); 5];
        let err = engine.fit(&vectors, None).unwrap_err();
        assert!(matches!(err, ClusteringError::Degenerate { .. }));
        assert!(matches!(MatchupError::from(err), MatchupError::NumericalFit { .. }));
    }

    #[test]
    fn test_search_capped_by_distinct_rows() {
        let mut vectors = vec![blob(1.0, 0.0, 0.0); 4];
        vectors.extend(vec![blob(0.0, 2.0, 0.0); 4]);
        vectors.push(blob(3.0, 3.0, 0.0));

        let outcome = ClusteringEngine::new(ClusteringConfig::default())
            .fit(&vectors, None)
            .unwrap();
        assert_eq!(outcome.scores.last().unwrap().k, 3);
    }

    #[test]
    fn test_compact_clusters_renumbers() {
        let centroids = Array2::from_shape_vec((3, FEATURE_COUNT), vec![0.0; 3 * FEATURE_COUNT]).unwrap();
        let (labels, kept) = compact_clusters(vec![0, 2, 2, 0], &centroids);
        assert_eq!(labels, vec![0, 1, 1, 0]);
        assert_eq!(kept.len(), 2);
    }
}
