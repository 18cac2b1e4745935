use thiserror::Error;

/// Message the surrounding application shows instead of internal detail.
pub const UNAVAILABLE_MESSAGE: &str = "prediction temporarily unavailable for this matchup";

/// Discriminated failure surfaced at the build coordinator boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchupError {
    #[error("Cannot build a model yet: {reason}")]
    InsufficientData { reason: String },

    #[error("Clustering failed: {reason}")]
    NumericalFit { reason: String },

    #[error("Artifact storage failed for {key}: {reason}")]
    Storage {
        key: String,
        reason: String,
        transient: bool,
    },

    #[error("Match data unavailable for league {league}: {reason}")]
    Dataset { league: String, reason: String },

    #[error("Build aborted: {reason}")]
    BuildAborted { reason: String },
}

impl MatchupError {
    pub fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientData { reason: reason.into() }
    }

    pub fn numerical(reason: impl Into<String>) -> Self {
        Self::NumericalFit { reason: reason.into() }
    }

    /// Only transient storage I/O is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { transient: true, .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::NumericalFit { .. } => "numerical_fit",
            Self::Storage { .. } => "storage",
            Self::Dataset { .. } => "dataset",
            Self::BuildAborted { .. } => "build_aborted",
        }
    }

    pub fn user_message(&self) -> &'static str {
        UNAVAILABLE_MESSAGE
    }
}

pub type Result<T> = std::result::Result<T, MatchupError>;
