use async_trait::async_trait;
use matchup_models::{ArtifactBundle, MatchupError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bumped whenever the serialized layout of [`ArtifactBundle`] changes.
pub const ARTIFACT_FORMAT_VERSION: u32 = 2;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error during {op} of {key}: {source}")]
    Io {
        op: &'static str,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode artifact {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("failed to decode artifact {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("artifact {key} has format version {found}, expected {expected}")]
    VersionMismatch { key: String, found: u32, expected: u32 },
}

impl StoreError {
    pub fn key(&self) -> &str {
        match self {
            Self::Io { key, .. }
            | Self::Encode { key, .. }
            | Self::Decode { key, .. }
            | Self::VersionMismatch { key, .. } => key,
        }
    }

    /// I/O failures may succeed on another attempt; codec failures will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// The blob exists but cannot be turned back into a bundle.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::VersionMismatch { .. })
    }
}

impl From<StoreError> for MatchupError {
    fn from(err: StoreError) -> Self {
        MatchupError::Storage {
            key: err.key().to_string(),
            transient: err.is_transient(),
            reason: err.to_string(),
        }
    }
}

/// Durable home of fitted matchup models, addressed by cache key.
///
/// `put` must be visible to the next `get`, and a failed or interrupted `put`
/// must leave whatever was stored before untouched and readable.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<ArtifactBundle>, StoreError>;

    async fn put(&self, key: &str, bundle: &ArtifactBundle) -> Result<(), StoreError>;

    /// Drops one key's artifact, forcing the next request to rebuild it.
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    bundle: &'a ArtifactBundle,
}

#[derive(Deserialize)]
struct Envelope {
    format_version: u32,
    bundle: ArtifactBundle,
}

pub fn encode_artifact(key: &str, bundle: &ArtifactBundle) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(&EnvelopeRef {
        format_version: ARTIFACT_FORMAT_VERSION,
        bundle,
    })
    .map_err(|e| StoreError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

pub fn decode_artifact(key: &str, bytes: &[u8]) -> Result<ArtifactBundle, StoreError> {
    let decode_err = |e: bincode::Error| StoreError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    };

    // The version is the leading field, so it can be read before the body.
    let found: u32 = bincode::deserialize(bytes).map_err(decode_err)?;
    if found != ARTIFACT_FORMAT_VERSION {
        return Err(StoreError::VersionMismatch {
            key: key.to_string(),
            found,
            expected: ARTIFACT_FORMAT_VERSION,
        });
    }

    let envelope: Envelope = bincode::deserialize(bytes).map_err(decode_err)?;
    Ok(envelope.bundle)
}
