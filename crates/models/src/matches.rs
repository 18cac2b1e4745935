use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::features::Feature;

/// One finished historical fixture.
///
/// Statistic columns are optional so that incomplete source rows can be
/// detected and rejected by feature preparation instead of being zero-filled.
/// Field aliases accept football-data.co.uk column headers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRecord {
    #[serde(alias = "HomeTeam")]
    pub home_team: String,
    #[serde(alias = "AwayTeam")]
    pub away_team: String,
    #[serde(alias = "Date", deserialize_with = "deserialize_match_date")]
    pub match_date: NaiveDate,

    #[serde(alias = "FTHG", default)]
    pub home_goals: Option<u32>,
    #[serde(alias = "FTAG", default)]
    pub away_goals: Option<u32>,
    #[serde(alias = "HTHG", default)]
    pub home_ht_goals: Option<u32>,
    #[serde(alias = "HTAG", default)]
    pub away_ht_goals: Option<u32>,
    #[serde(alias = "HS", default)]
    pub home_shots: Option<u32>,
    #[serde(alias = "AS", default)]
    pub away_shots: Option<u32>,
    #[serde(alias = "HST", default)]
    pub home_shots_on_target: Option<u32>,
    #[serde(alias = "AST", default)]
    pub away_shots_on_target: Option<u32>,
    #[serde(alias = "HC", default)]
    pub home_corners: Option<u32>,
    #[serde(alias = "AC", default)]
    pub away_corners: Option<u32>,
    #[serde(alias = "HF", default)]
    pub home_fouls: Option<u32>,
    #[serde(alias = "AF", default)]
    pub away_fouls: Option<u32>,
    #[serde(alias = "HY", default)]
    pub home_yellow_cards: Option<u32>,
    #[serde(alias = "AY", default)]
    pub away_yellow_cards: Option<u32>,
    #[serde(alias = "HR", default)]
    pub home_red_cards: Option<u32>,
    #[serde(alias = "AR", default)]
    pub away_red_cards: Option<u32>,
}

impl MatchRecord {
    pub fn new(home_team: impl Into<String>, away_team: impl Into<String>, match_date: NaiveDate) -> Self {
        Self {
            home_team: home_team.into(),
            away_team: away_team.into(),
            match_date,
            home_goals: None,
            away_goals: None,
            home_ht_goals: None,
            away_ht_goals: None,
            home_shots: None,
            away_shots: None,
            home_shots_on_target: None,
            away_shots_on_target: None,
            home_corners: None,
            away_corners: None,
            home_fouls: None,
            away_fouls: None,
            home_yellow_cards: None,
            away_yellow_cards: None,
            home_red_cards: None,
            away_red_cards: None,
        }
    }

    /// Builder used by ingestion code and tests to fill one statistic.
    pub fn with_stat(mut self, feature: Feature, value: u32) -> Self {
        *self.stat_slot(feature) = Some(value);
        self
    }

    pub fn with_score(self, home: u32, away: u32) -> Self {
        self.with_stat(Feature::HomeGoals, home)
            .with_stat(Feature::AwayGoals, away)
    }

    pub fn stat(&self, feature: Feature) -> Option<u32> {
        match feature {
            Feature::HomeGoals => self.home_goals,
            Feature::AwayGoals => self.away_goals,
            Feature::HomeHalfTimeGoals => self.home_ht_goals,
            Feature::AwayHalfTimeGoals => self.away_ht_goals,
            Feature::HomeShots => self.home_shots,
            Feature::AwayShots => self.away_shots,
            Feature::HomeShotsOnTarget => self.home_shots_on_target,
            Feature::AwayShotsOnTarget => self.away_shots_on_target,
            Feature::HomeCorners => self.home_corners,
            Feature::AwayCorners => self.away_corners,
            Feature::HomeFouls => self.home_fouls,
            Feature::AwayFouls => self.away_fouls,
            Feature::HomeYellowCards => self.home_yellow_cards,
            Feature::AwayYellowCards => self.away_yellow_cards,
            Feature::HomeRedCards => self.home_red_cards,
            Feature::AwayRedCards => self.away_red_cards,
        }
    }

    fn stat_slot(&mut self, feature: Feature) -> &mut Option<u32> {
        match feature {
            Feature::HomeGoals => &mut self.home_goals,
            Feature::AwayGoals => &mut self.away_goals,
            Feature::HomeHalfTimeGoals => &mut self.home_ht_goals,
            Feature::AwayHalfTimeGoals => &mut self.away_ht_goals,
            Feature::HomeShots => &mut self.home_shots,
            Feature::AwayShots => &mut self.away_shots,
            Feature::HomeShotsOnTarget => &mut self.home_shots_on_target,
            Feature::AwayShotsOnTarget => &mut self.away_shots_on_target,
            Feature::HomeCorners => &mut self.home_corners,
            Feature::AwayCorners => &mut self.away_corners,
            Feature::HomeFouls => &mut self.home_fouls,
            Feature::AwayFouls => &mut self.away_fouls,
            Feature::HomeYellowCards => &mut self.home_yellow_cards,
            Feature::AwayYellowCards => &mut self.away_yellow_cards,
            Feature::HomeRedCards => &mut self.home_red_cards,
            Feature::AwayRedCards => &mut self.away_red_cards,
        }
    }

    pub fn is_home(&self, team: &str) -> bool {
        same_team(&self.home_team, team)
    }

    pub fn is_away(&self, team: &str) -> bool {
        same_team(&self.away_team, team)
    }

    pub fn involves(&self, team: &str) -> bool {
        self.is_home(team) || self.is_away(team)
    }

    /// True when the fixture was played between `a` and `b`, in either orientation.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.is_home(a) && self.is_away(b)) || (self.is_home(b) && self.is_away(a))
    }
}

/// Team names compare case-insensitively with whitespace runs collapsed.
pub fn same_team(a: &str, b: &str) -> bool {
    a.split_whitespace()
        .map(str::to_lowercase)
        .eq(b.split_whitespace().map(str::to_lowercase))
}

/// All head-to-head fixtures between two teams, home/away in either order.
pub fn matches_between(records: &[MatchRecord], team_a: &str, team_b: &str) -> Vec<MatchRecord> {
    records
        .iter()
        .filter(|m| m.is_between(team_a, team_b))
        .cloned()
        .collect()
}

/// The `limit` most recent fixtures played by `team`, newest first.
pub fn recent_matches_of(records: &[MatchRecord], team: &str, limit: usize) -> Vec<MatchRecord> {
    let mut played: Vec<MatchRecord> = records.iter().filter(|m| m.involves(team)).cloned().collect();
    played.sort_by(|a, b| b.match_date.cmp(&a.match_date));
    played.truncate(limit);
    played
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d/%m/%y"];

fn deserialize_match_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised match date: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_is_between_is_orientation_free_and_case_insensitive() {
        let record = MatchRecord::new("Real Madrid", "Barcelona", date(2024, 10, 26));
        assert!(record.is_between("barcelona", "REAL MADRID"));
        assert!(record.is_between("Real Madrid", "Barcelona"));
        assert!(!record.is_between("Real Madrid", "Sevilla"));
        assert!(record.is_between(" real  madrid", "Barcelona "));
        assert!(!same_team("Real Madrid", "RealMadrid"));
    }

    #[test]
    fn test_recent_matches_newest_first() {
        let records = vec![
            MatchRecord::new("Lazio", "Roma", date(2023, 1, 1)),
            MatchRecord::new("Napoli", "Lazio", date(2024, 1, 1)),
            MatchRecord::new("Inter", "Milan", date(2024, 2, 1)),
            MatchRecord::new("Lazio", "Torino", date(2023, 6, 1)),
        ];
        let recent = recent_matches_of(&records, "lazio", 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].match_date, date(2024, 1, 1));
        assert_eq!(recent[1].match_date, date(2023, 6, 1));
    }

    #[test]
    fn test_deserialize_football_data_columns() {
        let json = r#"{
            "HomeTeam": "Arsenal", "AwayTeam": "Chelsea", "Date": "19/08/2023",
            "FTHG": 2, "FTAG": 1, "HS": 14
        }"#;
        let record: MatchRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.home_team, "Arsenal");
        assert_eq!(record.match_date, date(2023, 8, 19));
        assert_eq!(record.stat(Feature::HomeGoals), Some(2));
        assert_eq!(record.stat(Feature::HomeShots), Some(14));
        assert_eq!(record.stat(Feature::AwayCorners), None);
    }

    #[test]
    fn test_with_stat_round_trips_every_column() {
        let mut record = MatchRecord::new("A", "B", date(2024, 3, 3));
        for (i, feature) in Feature::ALL.iter().enumerate() {
            record = record.with_stat(*feature, i as u32);
        }
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(record.stat(*feature), Some(i as u32));
        }
    }
}
