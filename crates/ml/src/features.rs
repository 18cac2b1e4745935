// Feature engineering

use matchup_models::{recent_matches_of, Feature, FeatureVector, MatchRecord, MatchupError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("no matches to prepare")]
    NoMatches,

    #[error("match {row} ({home} vs {away}) is missing statistic column {column}")]
    MissingStatistic {
        row: usize,
        home: String,
        away: String,
        column: &'static str,
    },

    #[error("no recent {feature} data for {team}")]
    NoRecentForm { team: String, feature: &'static str },
}

impl From<FeatureError> for MatchupError {
    fn from(err: FeatureError) -> Self {
        MatchupError::insufficient(err.to_string())
    }
}

/// Projects raw match rows onto the fixed 16-column feature layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// One vector per match, in input order. Any record lacking a statistic
    /// fails the whole batch rather than being zero-filled.
    pub fn prepare(&self, records: &[MatchRecord]) -> Result<Vec<FeatureVector>, FeatureError> {
        if records.is_empty() {
            return Err(FeatureError::NoMatches);
        }

        records
            .iter()
            .enumerate()
            .map(|(row, record)| Self::project(row, record))
            .collect()
    }

    fn project(row: usize, record: &MatchRecord) -> Result<FeatureVector, FeatureError> {
        let mut vector = FeatureVector::zeros();
        for feature in Feature::ALL {
            let value = record.stat(feature).ok_or_else(|| FeatureError::MissingStatistic {
                row,
                home: record.home_team.clone(),
                away: record.away_team.clone(),
                column: feature.source_column(),
            })?;
            vector.set(feature, f64::from(value));
        }
        Ok(vector)
    }

    /// Expected statistics for an unplayed fixture, from each side's recent form.
    ///
    /// For every statistic a team's figure is the average of its home-side mean
    /// (over its last `window` home games) and its away-side mean (over its away
    /// games); a side with no games falls back to the other. The home team fills
    /// the home columns, the away team the away columns.
    pub fn expected_fixture(
        &self,
        league_records: &[MatchRecord],
        home_team: &str,
        away_team: &str,
        window: usize,
    ) -> Result<FeatureVector, FeatureError> {
        let home_recent = recent_matches_of(league_records, home_team, window);
        let away_recent = recent_matches_of(league_records, away_team, window);

        let mut vector = FeatureVector::zeros();
        for feature in Feature::ALL {
            let (team, recent) = if feature.is_home_side() {
                (home_team, &home_recent)
            } else {
                (away_team, &away_recent)
            };
            let value = Self::team_form(recent, team, feature).ok_or_else(|| FeatureError::NoRecentForm {
                team: team.to_string(),
                feature: feature.name(),
            })?;
            vector.set(feature, value);
        }
        Ok(vector)
    }

    // `feature` names the statistic; which column is read depends on the side
    // the team played on in each fixture.
    fn team_form(recent: &[MatchRecord], team: &str, feature: Feature) -> Option<f64> {
        let (home_col, away_col) = if feature.is_home_side() {
            (feature, feature.mirrored())
        } else {
            (feature.mirrored(), feature)
        };

        let as_home = mean(recent.iter().filter(|m| m.is_home(team)).filter_map(|m| m.stat(home_col)));
        let as_away = mean(recent.iter().filter(|m| m.is_away(team)).filter_map(|m| m.stat(away_col)));

        match (as_home, as_away) {
            (Some(h), Some(a)) => Some((h + a) / 2.0),
            (Some(h), None) => Some(h),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }
}

fn mean(values: impl Iterator<Item = u32>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + f64::from(v), c + 1));
    (count > 0).then(|| sum / count as f64)
}
