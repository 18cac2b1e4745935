// Feature preparation -> clustering -> profiling, behind one seam

use matchup_ml::{ClusteringConfig, ClusteringEngine, FeatureEngineer, LabelThresholds, ProfileGenerator};
use matchup_models::{ClusterCentroids, ClusterProfile, FeatureScaler, KScore, MatchRecord, MatchupError};
use tracing::debug;

/// Everything a build produces besides its bookkeeping fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub scaler: FeatureScaler,
    pub centroids: ClusterCentroids,
    pub profiles: Vec<ClusterProfile>,
    pub scores: Vec<KScore>,
    pub cluster_count: usize,
    pub policy: String,
    pub match_count: usize,
}

/// Turns the matches between two teams into a fitted model.
///
/// Runs on a blocking thread, so implementations are synchronous.
pub trait ModelTrainer: Send + Sync {
    fn train(&self, matches: &[MatchRecord], cluster_hint: Option<usize>) -> Result<TrainedModel, MatchupError>;
}

pub struct KMeansTrainer {
    engineer: FeatureEngineer,
    engine: ClusteringEngine,
    profiles: ProfileGenerator,
}

impl KMeansTrainer {
    pub fn new(engine: ClusteringEngine, thresholds: LabelThresholds) -> Self {
        Self {
            engineer: FeatureEngineer::new(),
            engine,
            profiles: ProfileGenerator::new(thresholds),
        }
    }
}

impl Default for KMeansTrainer {
    fn default() -> Self {
        Self::new(ClusteringEngine::new(ClusteringConfig::default()), LabelThresholds::default())
    }
}

impl ModelTrainer for KMeansTrainer {
    fn train(&self, matches: &[MatchRecord], cluster_hint: Option<usize>) -> Result<TrainedModel, MatchupError> {
        let vectors = self.engineer.prepare(matches)?;
        let outcome = self.engine.fit(&vectors, cluster_hint)?;
        let profiles = self.profiles.generate(&vectors, &outcome.labels, outcome.chosen_k);

        debug!(
            matches = vectors.len(),
            k = outcome.chosen_k,
            policy = outcome.policy,
            "🧮 matchup model trained"
        );

        Ok(TrainedModel {
            scaler: outcome.scaler,
            centroids: outcome.centroids,
            profiles,
            scores: outcome.scores,
            cluster_count: outcome.chosen_k,
            policy: outcome.policy.to_string(),
            match_count: vectors.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use matchup_models::Feature;

    fn record(day: u32, home_goals: u32, away_goals: u32) -> MatchRecord {
        let date = NaiveDate::from_ymd_opt(2024, 2, day).unwrap();
        Feature::ALL
            .iter()
            .fold(MatchRecord::new("Barcelona", "Sevilla", date), |r, f| r.with_stat(*f, 2))
            .with_score(home_goals, away_goals)
    }

    #[test]
    fn test_profiles_cover_every_match() {
        let matches: Vec<MatchRecord> = (1..=8).map(|d| record(d, d % 4, (d + 1) % 3)).collect();
        let model = KMeansTrainer::default().train(&matches, None).unwrap();

        assert_eq!(model.match_count, 8);
        assert_eq!(model.profiles.len(), model.cluster_count);
        assert_eq!(model.centroids.len(), model.cluster_count);
        assert_eq!(model.profiles.iter().map(|p| p.match_count).sum::<usize>(), 8);
        assert_eq!(model.policy, "max_pseudo_r2");
    }

    #[test]
    fn test_missing_statistic_is_insufficient_data() {
        let mut matches: Vec<MatchRecord> = (1..=4).map(|d| record(d, d, 0)).collect();
        matches[2].home_corners = None;
        let err = KMeansTrainer::default().train(&matches, None).unwrap_err();
        assert!(matches!(err, MatchupError::InsufficientData { .. }));
    }

    #[test]
    fn test_no_matches_is_insufficient_data() {
        let err = KMeansTrainer::default().train(&[], None).unwrap_err();
        assert!(matches!(err, MatchupError::InsufficientData { .. }));
    }
}
