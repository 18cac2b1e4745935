// Prediction service

use std::sync::Arc;

use chrono::{DateTime, Utc};
use matchup_ml::{fixture_summary, FeatureEngineer};
use matchup_models::{ClusterProfile, FeatureVector, KScore, MatchupError, MatchupPrediction};
use matchup_store::DatasetAccessor;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coordinator::{BuildCoordinator, CacheOutcome, ResolvedArtifact};

pub const DEFAULT_FORM_WINDOW: usize = 40;

/// How a set of profiles came to be, for operators and API consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub cache_key: String,
    pub outcome: CacheOutcome,
    pub chosen_k: usize,
    pub policy: String,
    pub scores: Vec<KScore>,
    pub match_count: usize,
    pub build_timestamp: DateTime<Utc>,
    pub data_as_of: DateTime<Utc>,
}

impl Diagnostics {
    fn from_resolved(resolved: &ResolvedArtifact) -> Self {
        let bundle = &resolved.bundle;
        Self {
            cache_key: resolved.key.to_string(),
            outcome: resolved.outcome,
            chosen_k: bundle.cluster_count,
            policy: bundle.policy.clone(),
            scores: bundle.scores.clone(),
            match_count: bundle.match_count,
            build_timestamp: bundle.build_timestamp,
            data_as_of: bundle.data_as_of,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilesResponse {
    pub profiles: Vec<ClusterProfile>,
    pub diagnostics: Diagnostics,
}

/// Caller-facing entry point. Holds no model state of its own; every answer
/// comes from the artifact the coordinator resolves for that request.
pub struct PredictorService {
    coordinator: Arc<BuildCoordinator>,
    dataset: Arc<dyn DatasetAccessor>,
    engineer: FeatureEngineer,
    form_window: usize,
}

impl PredictorService {
    pub fn new(coordinator: Arc<BuildCoordinator>, dataset: Arc<dyn DatasetAccessor>, form_window: usize) -> Self {
        Self {
            coordinator,
            dataset,
            engineer: FeatureEngineer::new(),
            form_window: form_window.max(1),
        }
    }

    pub fn coordinator(&self) -> &Arc<BuildCoordinator> {
        &self.coordinator
    }

    pub async fn resolve_profiles(
        &self,
        league: &str,
        team_a: &str,
        team_b: &str,
        cluster_hint: Option<usize>,
    ) -> Result<ProfilesResponse, MatchupError> {
        let resolved = self.coordinator.resolve(league, team_a, team_b, cluster_hint).await?;
        Ok(ProfilesResponse {
            profiles: resolved.bundle.profiles.clone(),
            diagnostics: Diagnostics::from_resolved(&resolved),
        })
    }

    /// Profile of the cluster nearest to `features` in the matchup's model.
    pub async fn predict(
        &self,
        league: &str,
        team_a: &str,
        team_b: &str,
        features: &FeatureVector,
    ) -> Result<ClusterProfile, MatchupError> {
        if !features.is_finite() {
            return Err(MatchupError::insufficient("feature vector contains non-finite values"));
        }
        let resolved = self.coordinator.resolve(league, team_a, team_b, None).await?;
        let (_, profile) = assign(&resolved, features)?;
        Ok(profile)
    }

    /// Predicts an unplayed fixture from both sides' recent league form.
    pub async fn predict_upcoming(
        &self,
        league: &str,
        home_team: &str,
        away_team: &str,
    ) -> Result<MatchupPrediction, MatchupError> {
        let resolved = self.coordinator.resolve(league, home_team, away_team, None).await?;

        let league_matches = self.dataset.get_matches(league).await?;
        let expected = self
            .engineer
            .expected_fixture(&league_matches, home_team, away_team, self.form_window)?;

        let (cluster_id, profile) = assign(&resolved, &expected)?;
        let summary = fixture_summary(&profile, home_team, away_team);
        info!(
            key = %resolved.key,
            home_team,
            away_team,
            cluster_id,
            label = %profile.label,
            "🎯 upcoming fixture assigned"
        );

        Ok(MatchupPrediction {
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            cluster_id,
            profile,
            expected_features: expected,
            summary,
        })
    }
}

fn assign(resolved: &ResolvedArtifact, features: &FeatureVector) -> Result<(usize, ClusterProfile), MatchupError> {
    let bundle = &resolved.bundle;
    bundle
        .assign(features)
        .and_then(|id| bundle.profile(id).map(|p| (id, p.clone())))
        .ok_or_else(|| MatchupError::numerical(format!("artifact {} has no cluster for the input", resolved.key)))
}
