// Build coordination: load a fresh artifact or rebuild it, one build per key at a time

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use matchup_models::{matches_between, ArtifactBundle, MatchupError};
use matchup_store::{ArtifactStore, DatasetAccessor, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::cache_key::CacheKey;
use crate::freshness::{Freshness, FreshnessOracle};
use crate::metrics::BuildMetrics;
use crate::trainer::ModelTrainer;
use crate::worker_pool::BuildPool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub max_concurrent_builds: usize,
    /// Pause before the single retry of a transient storage failure.
    pub retry_backoff: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_builds: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            retry_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildReason {
    Missing,
    Stale,
    /// A blob was stored but could not be decoded.
    Unreadable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CacheOutcome {
    Hit,
    Built { reason: BuildReason },
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub key: CacheKey,
    pub bundle: Arc<ArtifactBundle>,
    pub outcome: CacheOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Idle,
    Checking,
    Loading,
    Building,
    Failed,
    Serving,
}

impl BuildState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Loading => "loading",
            Self::Building => "building",
            Self::Failed => "failed",
            Self::Serving => "serving",
        }
    }
}

enum Checked {
    Fresh(ArtifactBundle),
    NeedsBuild {
        reason: BuildReason,
        dataset_last_modified: DateTime<Utc>,
    },
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Holds one key's build lock and drops the map entry once nobody else wants it.
struct KeyLease {
    locks: Arc<LockMap>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        // Release first so the guard's reference is not counted below.
        self.guard.take();
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Everything a detached build task needs to fetch, train and commit.
#[derive(Clone)]
struct BuildContext {
    dataset: Arc<dyn DatasetAccessor>,
    store: Arc<dyn ArtifactStore>,
    trainer: Arc<dyn ModelTrainer>,
    pool: BuildPool,
    metrics: Arc<BuildMetrics>,
    retry_backoff: Duration,
}

struct BuildRequest {
    key: CacheKey,
    league: String,
    team_a: String,
    team_b: String,
    cluster_hint: Option<usize>,
    reason: BuildReason,
    data_as_of: DateTime<Utc>,
}

/// Decides between serving a stored artifact and rebuilding it.
///
/// For any cache key at most one build runs at a time. Callers arriving while a
/// build is running wait for it, re-check the store, and are served the
/// artifact it committed. The store is the only state shared across requests.
///
/// Builds run on tasks owned by the coordinator and keep the key lock until
/// they commit, so a caller that gives up mid-build does not release the key.
pub struct BuildCoordinator {
    ctx: BuildContext,
    locks: Arc<LockMap>,
    config: CoordinatorConfig,
}

impl BuildCoordinator {
    pub fn new(
        dataset: Arc<dyn DatasetAccessor>,
        store: Arc<dyn ArtifactStore>,
        trainer: Arc<dyn ModelTrainer>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            ctx: BuildContext {
                dataset,
                store,
                trainer,
                pool: BuildPool::new(config.max_concurrent_builds),
                metrics: Arc::new(BuildMetrics::new()),
                retry_backoff: config.retry_backoff,
            },
            locks: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn metrics(&self) -> &Arc<BuildMetrics> {
        &self.ctx.metrics
    }

    pub fn pool(&self) -> &BuildPool {
        &self.ctx.pool
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Number of keys with a build lock currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.locks.len()
    }

    /// Returns a fresh artifact for the matchup, building it if needed.
    pub async fn resolve(
        &self,
        league: &str,
        team_a: &str,
        team_b: &str,
        cluster_hint: Option<usize>,
    ) -> Result<ResolvedArtifact, MatchupError> {
        let key = CacheKey::with_cluster_hint(league, team_a, team_b, cluster_hint);
        self.ctx.metrics.record_request();

        let result = self.resolve_key(&key, league, team_a, team_b, cluster_hint).await;
        if let Err(e) = &result {
            error!(key = %key, league, team_a, team_b, kind = e.kind(), error = %e, "❌ matchup resolve failed");
        }
        result
    }

    /// Drops the stored artifact for a matchup so the next request rebuilds it.
    pub async fn invalidate(
        &self,
        league: &str,
        team_a: &str,
        team_b: &str,
        cluster_hint: Option<usize>,
    ) -> Result<bool, MatchupError> {
        let key = CacheKey::with_cluster_hint(league, team_a, team_b, cluster_hint);
        let _lease = self.lease(&key).await;
        let removed = self.ctx.store.remove(key.as_str()).await?;
        info!(key = %key, removed, "🗑️ artifact invalidated");
        Ok(removed)
    }

    async fn resolve_key(
        &self,
        key: &CacheKey,
        league: &str,
        team_a: &str,
        team_b: &str,
        cluster_hint: Option<usize>,
    ) -> Result<ResolvedArtifact, MatchupError> {
        let mut state = BuildState::Idle;

        transition(key, &mut state, BuildState::Checking);
        if let Checked::Fresh(bundle) = self.check(key, league).await? {
            transition(key, &mut state, BuildState::Loading);
            return Ok(self.serve(key, &mut state, bundle, CacheOutcome::Hit));
        }

        let lease = self.lease(key).await;

        // Another caller may have committed while this one waited.
        transition(key, &mut state, BuildState::Checking);
        let (reason, data_as_of) = match self.check(key, league).await? {
            Checked::Fresh(bundle) => {
                debug!(key = %key, "sharing artifact from concurrent build");
                transition(key, &mut state, BuildState::Loading);
                return Ok(self.serve(key, &mut state, bundle, CacheOutcome::Hit));
            }
            Checked::NeedsBuild {
                reason,
                dataset_last_modified,
            } => (reason, dataset_last_modified),
        };

        transition(key, &mut state, BuildState::Building);
        let request = BuildRequest {
            key: key.clone(),
            league: league.to_string(),
            team_a: team_a.to_string(),
            team_b: team_b.to_string(),
            cluster_hint,
            reason,
            data_as_of,
        };
        let ctx = self.ctx.clone();
        let task = tokio::spawn(async move {
            let result = ctx.run_build(request).await;
            drop(lease);
            result
        });

        let built = match task.await {
            Ok(result) => result,
            Err(e) => Err(MatchupError::BuildAborted { reason: e.to_string() }),
        };
        match built {
            Ok(bundle) => Ok(self.serve(key, &mut state, bundle, CacheOutcome::Built { reason })),
            Err(e) => {
                transition(key, &mut state, BuildState::Failed);
                Err(e)
            }
        }
    }

    async fn lease(&self, key: &CacheKey) -> KeyLease {
        let lock = self
            .locks
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        KeyLease {
            locks: self.locks.clone(),
            key: key.as_str().to_string(),
            guard: Some(guard),
        }
    }

    async fn check(&self, key: &CacheKey, league: &str) -> Result<Checked, MatchupError> {
        // Read the dataset clock before anything derived from the data.
        let dataset_last_modified = self.ctx.dataset.get_last_modified(league).await?;

        let (existing, unreadable) = match self.ctx.load(key).await {
            Ok(bundle) => (bundle, false),
            Err(e) if e.is_unreadable() => {
                warn!(key = %key, error = %e, "⚠️ stored artifact unreadable, rebuilding");
                (None, true)
            }
            Err(e) => return Err(e.into()),
        };

        let freshness = FreshnessOracle::check(existing.as_ref(), dataset_last_modified);
        let reason = match (freshness, existing) {
            (Freshness::Fresh, Some(bundle)) => return Ok(Checked::Fresh(bundle)),
            (Freshness::Stale { data_as_of, .. }, _) => {
                debug!(key = %key, %data_as_of, %dataset_last_modified, "artifact is stale");
                BuildReason::Stale
            }
            _ if unreadable => BuildReason::Unreadable,
            _ => BuildReason::Missing,
        };

        Ok(Checked::NeedsBuild {
            reason,
            dataset_last_modified,
        })
    }

    fn serve(&self, key: &CacheKey, state: &mut BuildState, bundle: ArtifactBundle, outcome: CacheOutcome) -> ResolvedArtifact {
        transition(key, state, BuildState::Serving);
        if outcome.is_hit() {
            self.ctx.metrics.record_hit();
            info!(key = %key, k = bundle.cluster_count, "📦 serving cached matchup model");
        }
        ResolvedArtifact {
            key: key.clone(),
            bundle: Arc::new(bundle),
            outcome,
        }
    }
}

impl BuildContext {
    /// Fetches, trains and commits one artifact. Runs to completion even when
    /// the caller that started it is gone.
    async fn run_build(&self, request: BuildRequest) -> Result<ArtifactBundle, MatchupError> {
        let BuildRequest { key, league, reason, .. } = &request;
        self.metrics.record_build_started();
        match reason {
            BuildReason::Stale => self.metrics.record_stale_rebuild(),
            BuildReason::Unreadable => self.metrics.record_unreadable_rebuild(),
            BuildReason::Missing => {}
        }

        let started = Instant::now();
        match self.build(&request).await {
            Ok(bundle) => {
                let elapsed = started.elapsed();
                self.metrics.record_build_succeeded(elapsed);
                info!(
                    key = %key,
                    league = %league,
                    ?reason,
                    k = bundle.cluster_count,
                    matches = bundle.match_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "✅ matchup model built"
                );
                Ok(bundle)
            }
            Err(e) => {
                self.metrics.record_build_failed();
                Err(e)
            }
        }
    }

    async fn build(&self, request: &BuildRequest) -> Result<ArtifactBundle, MatchupError> {
        let BuildRequest {
            key,
            league,
            team_a,
            team_b,
            cluster_hint,
            data_as_of,
            ..
        } = request;

        let league_matches = self.dataset.get_matches(league).await?;
        let matches = matches_between(&league_matches, team_a, team_b);
        if matches.is_empty() {
            return Err(MatchupError::insufficient(format!(
                "no matches between {team_a} and {team_b} in {league}"
            )));
        }

        let trainer = self.trainer.clone();
        let hint = *cluster_hint;
        let model = self.pool.run(move || trainer.train(&matches, hint)).await??;

        let (first, second) = key.teams();
        let bundle = ArtifactBundle {
            cache_key: key.to_string(),
            league: key.league().to_string(),
            team_a: first.to_string(),
            team_b: second.to_string(),
            cluster_count: model.cluster_count,
            scaler: model.scaler,
            centroids: model.centroids,
            profiles: model.profiles,
            scores: model.scores,
            policy: model.policy,
            match_count: model.match_count,
            build_timestamp: Utc::now().max(*data_as_of),
            data_as_of: *data_as_of,
        };

        self.persist(key, &bundle).await?;
        Ok(bundle)
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<ArtifactBundle>, StoreError> {
        match self.store.get(key.as_str()).await {
            Err(e) if e.is_transient() => {
                warn!(key = %key, error = %e, "⚠️ artifact read failed, retrying once");
                self.metrics.record_storage_retry();
                tokio::time::sleep(self.retry_backoff).await;
                self.store.get(key.as_str()).await
            }
            other => other,
        }
    }

    async fn persist(&self, key: &CacheKey, bundle: &ArtifactBundle) -> Result<(), MatchupError> {
        let first = match self.store.put(key.as_str(), bundle).await {
            Ok(()) => {
                self.metrics.record_store_write();
                return Ok(());
            }
            Err(e) => e,
        };
        if !first.is_transient() {
            return Err(first.into());
        }

        warn!(key = %key, error = %first, "⚠️ artifact write failed, retrying once");
        self.metrics.record_storage_retry();
        tokio::time::sleep(self.retry_backoff).await;

        self.store.put(key.as_str(), bundle).await?;
        self.metrics.record_store_write();
        Ok(())
    }
}

fn transition(key: &CacheKey, state: &mut BuildState, next: BuildState) {
    debug!(key = %key, from = state.as_str(), to = next.as_str(), "build state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::KMeansTrainer;
    use chrono::NaiveDate;
    use matchup_models::{Feature, MatchRecord};
    use matchup_store::{InMemoryArtifactStore, InMemoryDataset};

    fn record(day: u32, home_goals: u32, away_goals: u32) -> MatchRecord {
        let date = NaiveDate::from_ymd_opt(2023, 5, day).unwrap();
        Feature::ALL
            .iter()
            .fold(MatchRecord::new("Betis", "Sevilla", date), |r, f| r.with_stat(*f, 3))
            .with_score(home_goals, away_goals)
    }

    fn setup() -> (Arc<InMemoryDataset>, Arc<InMemoryArtifactStore>, BuildCoordinator) {
        let dataset = Arc::new(InMemoryDataset::new());
        dataset.insert_matches("laliga", (1..=10).map(|d| record(d, d % 3, d % 4)));
        let store = Arc::new(InMemoryArtifactStore::new());
        let coordinator = BuildCoordinator::new(
            dataset.clone(),
            store.clone(),
            Arc::new(KMeansTrainer::default()),
            CoordinatorConfig {
                max_concurrent_builds: 2,
                retry_backoff: Duration::from_millis(1),
            },
        );
        (dataset, store, coordinator)
    }

    #[tokio::test]
    async fn test_build_then_hit() {
        let (_, store, coordinator) = setup();

        let first = coordinator.resolve("laliga", "Betis", "Sevilla", None).await.unwrap();
        assert_eq!(first.outcome, CacheOutcome::Built { reason: BuildReason::Missing });
        assert!(first.bundle.data_as_of <= first.bundle.build_timestamp);

        let second = coordinator.resolve("laliga", "sevilla", "BETIS", None).await.unwrap();
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(second.bundle, first.bundle);
        assert_eq!(store.put_count(), 1);
        assert_eq!(coordinator.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_touch_forces_stale_rebuild() {
        let (dataset, store, coordinator) = setup();
        coordinator.resolve("laliga", "Betis", "Sevilla", None).await.unwrap();

        dataset.touch("laliga");
        let rebuilt = coordinator.resolve("laliga", "Betis", "Sevilla", None).await.unwrap();
        assert_eq!(rebuilt.outcome, CacheOutcome::Built { reason: BuildReason::Stale });
        assert_eq!(store.put_count(), 2);
        assert_eq!(coordinator.metrics().snapshot().stale_rebuilds, 1);
    }

    #[tokio::test]
    async fn test_unknown_matchup_is_insufficient_data() {
        let (_, store, coordinator) = setup();
        let err = coordinator.resolve("laliga", "Betis", "Getafe", None).await.unwrap_err();
        assert!(matches!(err, MatchupError::InsufficientData { .. }));
        assert_eq!(err.user_message(), matchup_models::UNAVAILABLE_MESSAGE);
        assert_eq!(store.put_count(), 0);
        assert_eq!(coordinator.metrics().snapshot().builds_failed, 1);
    }

    #[tokio::test]
    async fn test_unknown_league_is_dataset_error() {
        let (_, _, coordinator) = setup();
        let err = coordinator.resolve("ligue1", "Betis", "Sevilla", None).await.unwrap_err();
        assert!(matches!(err, MatchupError::Dataset { .. }));
    }

    #[tokio::test]
    async fn test_invalidate_then_rebuild() {
        let (_, store, coordinator) = setup();
        coordinator.resolve("laliga", "Betis", "Sevilla", None).await.unwrap();
        assert!(coordinator.invalidate("laliga", "Betis", "Sevilla", None).await.unwrap());

        let rebuilt = coordinator.resolve("laliga", "Betis", "Sevilla", None).await.unwrap();
        assert_eq!(rebuilt.outcome, CacheOutcome::Built { reason: BuildReason::Missing });
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_hint_uses_separate_entry() {
        let (_, store, coordinator) = setup();
        let searched = coordinator.resolve("laliga", "Betis", "Sevilla", None).await.unwrap();
        let hinted = coordinator.resolve("laliga", "Betis", "Sevilla", Some(2)).await.unwrap();

        assert_ne!(searched.key, hinted.key);
        assert_eq!(hinted.bundle.cluster_count, 2);
        assert_eq!(hinted.bundle.policy, "fixed_hint");
        assert_eq!(store.len(), 2);
    }
}
