// Deterministic artifact keys for (league, team pair)

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SLUG_MAX_LEN: usize = 48;
const HASH_HEX_LEN: usize = 16;

/// Identity of one matchup model in the artifact store.
///
/// Team order does not matter: `(A, B)` and `(B, A)` share a key because the
/// model is built from every match between the two in either orientation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    key: String,
    league: String,
    teams: (String, String),
    cluster_hint: Option<usize>,
}

impl CacheKey {
    pub fn new(league: &str, team_a: &str, team_b: &str) -> Self {
        Self::with_cluster_hint(league, team_a, team_b, None)
    }

    /// A hinted build is a different model, so it lives under its own key.
    pub fn with_cluster_hint(league: &str, team_a: &str, team_b: &str, hint: Option<usize>) -> Self {
        let league = normalize(league);
        let (first, second) = {
            let a = normalize(team_a);
            let b = normalize(team_b);
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        };

        // Unit separators keep ("a b", "c") and ("a", "b c") apart after normalization.
        let mut material = format!("{league}\u{1f}{first}\u{1f}{second}");
        if let Some(k) = hint {
            material.push_str(&format!("#k{k}"));
        }

        let digest = Sha256::digest(material.as_bytes());
        let hash: String = digest
            .iter()
            .take(HASH_HEX_LEN / 2)
            .map(|b| format!("{b:02x}"))
            .collect();

        let slug = slugify(&format!("{league}_{first}_{second}"));
        Self {
            key: format!("{slug}_{hash}"),
            league,
            teams: (first, second),
            cluster_hint: hint,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn league(&self) -> &str {
        &self.league
    }

    /// Normalized team names in canonical order.
    pub fn teams(&self) -> (&str, &str) {
        (&self.teams.0, &self.teams.1)
    }

    pub fn cluster_hint(&self) -> Option<usize> {
        self.cluster_hint
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// Trim, lower-case, and collapse internal whitespace runs into one space.
///
/// Two names normalize equal exactly when `same_team` considers them the same
/// team, so `Real Madrid` and `Real_Madrid` stay distinct.
pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn slugify(text: &str) -> String {
    text.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .take(SLUG_MAX_LEN)
        .collect()
}
