use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::profiles::ClusterProfile;

/// Per-column standardization fitted on one matchup's history.
///
/// `scale` is a multiplier (`1 / std`), 1 for constant columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: [f64; FEATURE_COUNT],
    pub scale: [f64; FEATURE_COUNT],
}

impl FeatureScaler {
    pub fn transform(&self, vector: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in vector.as_slice().iter().enumerate() {
            out[i] = (value - self.mean[i]) * self.scale[i];
        }
        out
    }
}

/// Fitted cluster centres, in scaled feature space, indexed by cluster id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroids {
    pub centers: Vec<[f64; FEATURE_COUNT]>,
}

impl ClusterCentroids {
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Index of the nearest centre by squared Euclidean distance; ties go to the lower id.
    pub fn nearest(&self, point: &[f64; FEATURE_COUNT]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (id, center) in self.centers.iter().enumerate() {
            let dist: f64 = center
                .iter()
                .zip(point.iter())
                .map(|(c, p)| (c - p) * (c - p))
                .sum();
            match best {
                Some((_, d)) if dist >= d => {}
                _ => best = Some((id, dist)),
            }
        }
        best.map(|(id, _)| id)
    }
}

/// Goodness score recorded for one candidate cluster count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KScore {
    pub k: usize,
    pub sse: f64,
    pub pseudo_r2: f64,
}

/// Everything needed to reuse a fitted matchup model without refitting.
///
/// Profiles travel inside the bundle so a stored artifact can never pair a
/// clusterer with profiles computed from a different snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub cache_key: String,
    pub league: String,
    pub team_a: String,
    pub team_b: String,
    pub cluster_count: usize,
    pub scaler: FeatureScaler,
    pub centroids: ClusterCentroids,
    pub profiles: Vec<ClusterProfile>,
    pub scores: Vec<KScore>,
    pub policy: String,
    pub match_count: usize,
    pub build_timestamp: DateTime<Utc>,
    /// Dataset last-modified time observed before the matches were read.
    pub data_as_of: DateTime<Utc>,
}

impl ArtifactBundle {
    pub fn profile(&self, cluster_id: usize) -> Option<&ClusterProfile> {
        self.profiles.iter().find(|p| p.cluster_id == cluster_id)
    }

    /// Scales `vector` with the stored scaler and returns the nearest cluster id.
    pub fn assign(&self, vector: &FeatureVector) -> Option<usize> {
        self.centroids.nearest(&self.scaler.transform(vector))
    }
}
