// Cluster profiling: aggregates, outcome shares, labels and narrative text

use matchup_models::{ClusterLabel, ClusterProfile, Feature, FeatureVector, OutcomeProbabilities, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Thresholds for the ordered label rules. The first rule that matches wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelThresholds {
    pub draw_share: f64,
    pub dominant_share: f64,
    pub high_scoring_goals: f64,
    pub defensive_goals: f64,
    pub physical_cards: f64,
    pub physical_fouls: f64,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            draw_share: 0.40,
            dominant_share: 0.60,
            high_scoring_goals: 4.0,
            defensive_goals: 2.0,
            physical_cards: 4.0,
            physical_fouls: 22.0,
        }
    }
}

const ROUT_MARGIN: f64 = 3.0;

#[derive(Debug, Clone, Default)]
pub struct ProfileGenerator {
    thresholds: LabelThresholds,
}

impl ProfileGenerator {
    pub fn new(thresholds: LabelThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &LabelThresholds {
        &self.thresholds
    }

    /// One profile per cluster id in `0..k`, ordered by id.
    pub fn generate(&self, vectors: &[FeatureVector], labels: &[usize], k: usize) -> Vec<ClusterProfile> {
        (0..k)
            .map(|cluster_id| {
                let members: Vec<&FeatureVector> = vectors
                    .iter()
                    .zip(labels)
                    .filter(|(_, label)| **label == cluster_id)
                    .map(|(v, _)| v)
                    .collect();
                self.profile(cluster_id, &members)
            })
            .collect()
    }

    fn profile(&self, cluster_id: usize, members: &[&FeatureVector]) -> ClusterProfile {
        let count = members.len();
        let share = |pred: &dyn Fn(&FeatureVector) -> bool| -> f64 {
            if count == 0 {
                return 0.0;
            }
            round2(members.iter().filter(|&&v| pred(v)).count() as f64 / count as f64)
        };

        let mut sums = [0.0; FEATURE_COUNT];
        for v in members {
            for (s, value) in sums.iter_mut().zip(v.as_slice()) {
                *s += value;
            }
        }
        let mut means = FeatureVector::zeros();
        if count > 0 {
            for feature in Feature::ALL {
                means.set(feature, round2(sums[feature.index()] / count as f64));
            }
        }

        let goals = |v: &FeatureVector| (v.get(Feature::HomeGoals), v.get(Feature::AwayGoals));
        let ht = |v: &FeatureVector| (v.get(Feature::HomeHalfTimeGoals), v.get(Feature::AwayHalfTimeGoals));

        let probabilities = OutcomeProbabilities {
            home_win: share(&|v| goals(v).0 > goals(v).1),
            draw: share(&|v| goals(v).0 == goals(v).1),
            away_win: share(&|v| goals(v).0 < goals(v).1),
            both_teams_score: share(&|v| goals(v).0 > 0.0 && goals(v).1 > 0.0),
            half_time_home_lead: share(&|v| ht(v).0 > ht(v).1),
            half_time_draw: share(&|v| ht(v).0 == ht(v).1),
            half_time_away_lead: share(&|v| ht(v).0 < ht(v).1),
        };

        let mean_of = |f: &dyn Fn(&FeatureVector) -> f64| -> f64 {
            if count == 0 {
                return 0.0;
            }
            round2(members.iter().map(|&v| f(v)).sum::<f64>() / count as f64)
        };
        let mean_total_goals = mean_of(&|v| v.total_goals());
        let mean_total_cards = mean_of(&|v| {
            v.get(Feature::HomeYellowCards)
                + v.get(Feature::AwayYellowCards)
                + v.get(Feature::HomeRedCards)
                + v.get(Feature::AwayRedCards)
        });
        let mean_total_fouls = mean_of(&|v| v.get(Feature::HomeFouls) + v.get(Feature::AwayFouls));

        let home_routs = members.iter().filter(|&&v| goals(v).0 - goals(v).1 >= ROUT_MARGIN).count();
        let away_routs = members.iter().filter(|&&v| goals(v).1 - goals(v).0 >= ROUT_MARGIN).count();

        let mut profile = ClusterProfile {
            cluster_id,
            match_count: count,
            means,
            probabilities,
            mean_total_goals,
            mean_total_cards,
            mean_total_fouls,
            home_routs,
            away_routs,
            label: ClusterLabel::Balanced,
            narrative: String::new(),
        };
        profile.label = self.label(&profile);
        profile.narrative = narrative(&profile);
        profile
    }

    /// Applies the label rules in fixed priority order.
    pub fn label(&self, profile: &ClusterProfile) -> ClusterLabel {
        let t = &self.thresholds;
        let p = &profile.probabilities;

        if p.draw > t.draw_share {
            ClusterLabel::DrawProne
        } else if p.home_win > t.dominant_share {
            ClusterLabel::HomeDominant
        } else if p.away_win > t.dominant_share {
            ClusterLabel::AwayDominant
        } else if profile.mean_total_goals > t.high_scoring_goals {
            ClusterLabel::HighScoring
        } else if profile.mean_total_goals < t.defensive_goals {
            ClusterLabel::Defensive
        } else if profile.mean_total_cards > t.physical_cards || profile.mean_total_fouls > t.physical_fouls {
            ClusterLabel::Physical
        } else {
            ClusterLabel::Balanced
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn pct(share: f64) -> f64 {
    share * 100.0
}

/// Presentation-only description of one cluster.
pub fn narrative(profile: &ClusterProfile) -> String {
    let mut text = String::new();
    let (home, away) = profile.expected_score();
    let total = profile.mean_total_goals;
    let ht_total = profile.mean(Feature::HomeHalfTimeGoals) + profile.mean(Feature::AwayHalfTimeGoals);
    let shots = profile.mean(Feature::HomeShots) + profile.mean(Feature::AwayShots);
    let on_target = profile.mean(Feature::HomeShotsOnTarget) + profile.mean(Feature::AwayShotsOnTarget);

    let _ = writeln!(
        text,
        "Cluster {} ({}): {} matches, average score {home:.1} - {away:.1}.",
        profile.cluster_id, profile.label, profile.match_count
    );

    if profile.match_count == 0 {
        text.push_str("This cluster contains no matches.");
        return text;
    }

    if home > away + 1.0 {
        text.push_str("The home side usually controls the scoreline by a clear margin.\n");
    } else if away > home + 1.0 {
        text.push_str("The visitors tend to dictate the result.\n");
    } else {
        text.push_str("Scorelines are usually close.\n");
    }

    if ht_total < total * 0.4 {
        text.push_str("Most goals arrive after the break.\n");
    } else if ht_total > total * 0.6 {
        text.push_str("Many of these matches are settled in the first half.\n");
    } else {
        text.push_str("Goals are spread evenly across both halves.\n");
    }

    if profile.home_routs + profile.away_routs > 0 {
        let _ = writeln!(
            text,
            "There were {} home and {} away wins by three goals or more.",
            profile.home_routs, profile.away_routs
        );
    }

    let _ = writeln!(
        text,
        "Roughly {:.1}% of these matches end level.",
        pct(profile.probabilities.draw)
    );

    if shots > 25.0 {
        text.push_str("Attacking intensity is high, with plenty of attempts on goal.\n");
    } else if shots < 15.0 {
        text.push_str("Few shots are taken overall.\n");
    } else {
        text.push_str("Attacking intensity is moderate.\n");
    }

    if on_target > 10.0 {
        text.push_str("Both sides test the goalkeepers often.\n");
    } else if on_target < 6.0 {
        text.push_str("Shots on target are scarce.\n");
    }

    if profile.mean_total_cards > 4.0 {
        text.push_str("Expect friction: cards are shown frequently.\n");
    } else if profile.mean_total_fouls > 22.0 {
        text.push_str("The style is physical, with a high foul count.\n");
    } else if profile.mean_total_cards < 2.0 && profile.mean_total_fouls < 15.0 {
        text.push_str("Fair play dominates, with few stoppages.\n");
    }

    text.trim_end().to_string()
}

/// Prediction paragraph for an upcoming fixture assigned to `profile`.
pub fn fixture_summary(profile: &ClusterProfile, home_team: &str, away_team: &str) -> String {
    let p = &profile.probabilities;
    let (home, away) = profile.expected_score();
    let total = home + away;
    let mut text = String::new();

    let _ = write!(
        text,
        "This fixture falls into cluster {} ({}). {home_team} win {:.1}% of comparable matches, \
         {away_team} {:.1}%, and {:.1}% are drawn. ",
        profile.cluster_id,
        profile.label,
        pct(p.home_win),
        pct(p.away_win),
        pct(p.draw)
    );

    let _ = write!(
        text,
        "At half-time the home side averages {:.1} goals to {:.1}, leading at the break {:.1}% of the time. ",
        profile.mean(Feature::HomeHalfTimeGoals),
        profile.mean(Feature::AwayHalfTimeGoals),
        pct(p.half_time_home_lead)
    );

    let _ = write!(
        text,
        "The expected score is {home:.1} - {away:.1}; {} With {total:.1} goals expected, the line sits {} 2.5. ",
        if p.both_teams_score >= 0.5 {
            "both teams usually find the net."
        } else {
            "it is unlikely both teams score."
        },
        if total > 2.5 { "over" } else { "under" }
    );

    let _ = write!(
        text,
        "{home_team} average {:.1} shots on target and {:.1} corners against {:.1} and {:.1} for {away_team}. ",
        profile.mean(Feature::HomeShotsOnTarget),
        profile.mean(Feature::HomeCorners),
        profile.mean(Feature::AwayShotsOnTarget),
        profile.mean(Feature::AwayCorners)
    );

    let _ = write!(
        text,
        "Discipline: {:.1} yellow and {:.2} red cards for {home_team}, {:.1} and {:.2} for {away_team}. ",
        profile.mean(Feature::HomeYellowCards),
        profile.mean(Feature::HomeRedCards),
        profile.mean(Feature::AwayYellowCards),
        profile.mean(Feature::AwayRedCards)
    );

    let favoured = if p.home_win > p.away_win {
        home_team
    } else if p.away_win > p.home_win {
        away_team
    } else {
        "neither side"
    };
    let _ = write!(
        text,
        "Most likely score: {} - {}, with the balance favouring {favoured}.",
        home.round(),
        away.round()
    );

    text
}
