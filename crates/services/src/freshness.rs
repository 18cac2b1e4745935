use chrono::{DateTime, Utc};
use matchup_models::ArtifactBundle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Freshness {
    Missing,
    Stale {
        data_as_of: DateTime<Utc>,
        dataset_last_modified: DateTime<Utc>,
    },
    Fresh,
}

impl Freshness {
    pub fn needs_build(&self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

/// Timestamp-based invalidation. Any write to a league invalidates every
/// matchup of that league, related to the write or not.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreshnessOracle;

impl FreshnessOracle {
    /// A bundle is stale once the league has been written after the data the
    /// bundle was built from was read.
    pub fn check(bundle: Option<&ArtifactBundle>, dataset_last_modified: DateTime<Utc>) -> Freshness {
        match bundle {
            None => Freshness::Missing,
            Some(b) if dataset_last_modified > b.data_as_of => Freshness::Stale {
                data_as_of: b.data_as_of,
                dataset_last_modified,
            },
            Some(_) => Freshness::Fresh,
        }
    }
}
