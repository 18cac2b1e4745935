use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::{Feature, FeatureVector};

/// Short categorical description of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLabel {
    DrawProne,
    HomeDominant,
    AwayDominant,
    HighScoring,
    Defensive,
    Physical,
    Balanced,
}

impl ClusterLabel {
    pub const fn as_str(self) -> &'static str {
        match self {
            ClusterLabel::DrawProne => "draw-prone",
            ClusterLabel::HomeDominant => "home-dominant",
            ClusterLabel::AwayDominant => "away-dominant",
            ClusterLabel::HighScoring => "high-scoring",
            ClusterLabel::Defensive => "defensive",
            ClusterLabel::Physical => "physical",
            ClusterLabel::Balanced => "balanced",
        }
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome shares observed inside one cluster, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OutcomeProbabilities {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
    pub both_teams_score: f64,
    pub half_time_home_lead: f64,
    pub half_time_draw: f64,
    pub half_time_away_lead: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub cluster_id: usize,
    pub match_count: usize,
    pub means: FeatureVector,
    pub probabilities: OutcomeProbabilities,
    pub mean_total_goals: f64,
    pub mean_total_cards: f64,
    pub mean_total_fouls: f64,
    pub home_routs: usize,
    pub away_routs: usize,
    pub label: ClusterLabel,
    pub narrative: String,
}

impl ClusterProfile {
    pub fn mean(&self, feature: Feature) -> f64 {
        self.means.get(feature)
    }

    pub fn expected_score(&self) -> (f64, f64) {
        (self.mean(Feature::HomeGoals), self.mean(Feature::AwayGoals))
    }
}

/// Prediction for a fixture that has not been played yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupPrediction {
    pub home_team: String,
    pub away_team: String,
    pub cluster_id: usize,
    pub profile: ClusterProfile,
    pub expected_features: FeatureVector,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_display() {
        assert_eq!(ClusterLabel::DrawProne.to_string(), "draw-prone");
        assert_eq!(ClusterLabel::Balanced.to_string(), "balanced");
    }

    #[test]
    fn test_label_serializes_snake_case() {
        let json = serde_json::to_string(&ClusterLabel::HomeDominant).unwrap();
        assert_eq!(json, "\"home_dominant\"");
    }
}
