// Cluster-count selection policies

use matchup_models::KScore;

/// Chooses a cluster count from the scores of every candidate `k`.
pub trait ClusterCountPolicy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Returns the chosen `k`, or `None` when `scores` is empty.
    fn select(&self, scores: &[KScore]) -> Option<usize>;
}

/// Arg-max of pseudo R².
///
/// Pseudo R² never decreases as `k` grows, so this policy effectively picks
/// the largest candidate that fits. It is kept as the default because it is
/// what existing consumers of the profiles were calibrated against.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxPseudoR2;

impl ClusterCountPolicy for MaxPseudoR2 {
    fn name(&self) -> &'static str {
        "max_pseudo_r2"
    }

    fn select(&self, scores: &[KScore]) -> Option<usize> {
        argmax_by(scores, |s| s.pseudo_r2)
    }
}

/// Pseudo R² minus `penalty` per extra cluster; ties resolve to the smaller `k`.
#[derive(Debug, Clone, Copy)]
pub struct PenalizedPseudoR2 {
    pub penalty: f64,
}

impl Default for PenalizedPseudoR2 {
    fn default() -> Self {
        Self { penalty: 0.05 }
    }
}

impl ClusterCountPolicy for PenalizedPseudoR2 {
    fn name(&self) -> &'static str {
        "penalized_pseudo_r2"
    }

    fn select(&self, scores: &[KScore]) -> Option<usize> {
        argmax_by(scores, |s| s.pseudo_r2 - self.penalty * (s.k.saturating_sub(1)) as f64)
    }
}

/// Builds a policy from its configured name.
pub fn policy_from_name(name: &str, penalty: f64) -> Option<Box<dyn ClusterCountPolicy>> {
    match name {
        "max_pseudo_r2" => Some(Box::new(MaxPseudoR2)),
        "penalized_pseudo_r2" => Some(Box::new(PenalizedPseudoR2 { penalty })),
        _ => None,
    }
}

fn argmax_by(scores: &[KScore], score: impl Fn(&KScore) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    let mut ordered: Vec<&KScore> = scores.iter().collect();
    ordered.sort_by_key(|s| s.k);
    for s in ordered {
        let value = score(s);
        if !value.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if value <= b => {}
            _ => best = Some((s.k, value)),
        }
    }
    best.map(|(k, _)| k)
}
