use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of scalars in a [`FeatureVector`].
pub const FEATURE_COUNT: usize = 16;

/// One column of the per-match feature vector, in its fixed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    HomeGoals,
    AwayGoals,
    HomeHalfTimeGoals,
    AwayHalfTimeGoals,
    HomeShots,
    AwayShots,
    HomeShotsOnTarget,
    AwayShotsOnTarget,
    HomeCorners,
    AwayCorners,
    HomeFouls,
    AwayFouls,
    HomeYellowCards,
    AwayYellowCards,
    HomeRedCards,
    AwayRedCards,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::HomeGoals,
        Feature::AwayGoals,
        Feature::HomeHalfTimeGoals,
        Feature::AwayHalfTimeGoals,
        Feature::HomeShots,
        Feature::AwayShots,
        Feature::HomeShotsOnTarget,
        Feature::AwayShotsOnTarget,
        Feature::HomeCorners,
        Feature::AwayCorners,
        Feature::HomeFouls,
        Feature::AwayFouls,
        Feature::HomeYellowCards,
        Feature::AwayYellowCards,
        Feature::HomeRedCards,
        Feature::AwayRedCards,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Feature::HomeGoals => "home_goals",
            Feature::AwayGoals => "away_goals",
            Feature::HomeHalfTimeGoals => "home_ht_goals",
            Feature::AwayHalfTimeGoals => "away_ht_goals",
            Feature::HomeShots => "home_shots",
            Feature::AwayShots => "away_shots",
            Feature::HomeShotsOnTarget => "home_shots_on_target",
            Feature::AwayShotsOnTarget => "away_shots_on_target",
            Feature::HomeCorners => "home_corners",
            Feature::AwayCorners => "away_corners",
            Feature::HomeFouls => "home_fouls",
            Feature::AwayFouls => "away_fouls",
            Feature::HomeYellowCards => "home_yellow_cards",
            Feature::AwayYellowCards => "away_yellow_cards",
            Feature::HomeRedCards => "home_red_cards",
            Feature::AwayRedCards => "away_red_cards",
        }
    }

    /// Football-data.co.uk column header carrying this statistic.
    pub const fn source_column(self) -> &'static str {
        match self {
            Feature::HomeGoals => "FTHG",
            Feature::AwayGoals => "FTAG",
            Feature::HomeHalfTimeGoals => "HTHG",
            Feature::AwayHalfTimeGoals => "HTAG",
            Feature::HomeShots => "HS",
            Feature::AwayShots => "AS",
            Feature::HomeShotsOnTarget => "HST",
            Feature::AwayShotsOnTarget => "AST",
            Feature::HomeCorners => "HC",
            Feature::AwayCorners => "AC",
            Feature::HomeFouls => "HF",
            Feature::AwayFouls => "AF",
            Feature::HomeYellowCards => "HY",
            Feature::AwayYellowCards => "AY",
            Feature::HomeRedCards => "HR",
            Feature::AwayRedCards => "AR",
        }
    }

    pub const fn is_home_side(self) -> bool {
        self.index() % 2 == 0
    }

    /// The same statistic for the other side of the fixture.
    pub const fn mirrored(self) -> Feature {
        Feature::ALL[self.index() ^ 1]
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-order numeric projection of one match (or of an expected fixture).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub const fn zeros() -> Self {
        Self([0.0; FEATURE_COUNT])
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }

    pub fn set(&mut self, feature: Feature, value: f64) {
        self.0[feature.index()] = value;
    }

    pub fn with(mut self, feature: Feature, value: f64) -> Self {
        self.set(feature, value);
        self
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    pub fn total_goals(&self) -> f64 {
        self.get(Feature::HomeGoals) + self.get(Feature::AwayGoals)
    }

    pub fn named(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        Feature::ALL.iter().map(move |f| (*f, self.get(*f)))
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

impl From<[f64; FEATURE_COUNT]> for FeatureVector {
    fn from(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }
}
