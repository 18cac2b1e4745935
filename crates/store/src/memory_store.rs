use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use matchup_models::ArtifactBundle;
use parking_lot::RwLock;

use crate::artifact_store::{ArtifactStore, StoreError};

/// Process-local store. Each `put` replaces the whole bundle under the write
/// lock, so a reader sees either the old or the new value.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<String, ArtifactBundle>>,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn get(&self, key: &str) -> Result<Option<ArtifactBundle>, StoreError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.artifacts.read().get(key).cloned())
    }

    async fn put(&self, key: &str, bundle: &ArtifactBundle) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.artifacts.write().insert(key.to_string(), bundle.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.artifacts.write().remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.artifacts.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
