// Shared fixtures and test doubles for the integration suites
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use matchup_ml::{ClusteringConfig, ClusteringEngine, LabelThresholds};
use matchup_models::{ArtifactBundle, Feature, MatchRecord, MatchupError};
use matchup_services::{BuildCoordinator, CoordinatorConfig, KMeansTrainer, ModelTrainer, TrainedModel};
use matchup_store::{ArtifactStore, DatasetAccessor, InMemoryArtifactStore, InMemoryDataset, StoreError};

pub const LEAGUE: &str = "laliga";
pub const HOME: &str = "Real Betis";
pub const AWAY: &str = "Sevilla FC";

pub const SCENARIO_HOME_GOALS: [u32; 12] = [2, 1, 0, 3, 1, 2, 0, 0, 4, 1, 2, 1];
pub const SCENARIO_AWAY_GOALS: [u32; 12] = [1, 1, 2, 0, 0, 1, 0, 3, 1, 1, 0, 2];

/// A complete record whose non-goal statistics vary with `seed`.
pub fn full_record(home: &str, away: &str, date: NaiveDate, home_goals: u32, away_goals: u32, seed: u32) -> MatchRecord {
    let base = MatchRecord::new(home, away, date)
        .with_stat(Feature::HomeHalfTimeGoals, home_goals / 2)
        .with_stat(Feature::AwayHalfTimeGoals, away_goals / 2)
        .with_stat(Feature::HomeShots, 8 + home_goals * 3 + seed % 4)
        .with_stat(Feature::AwayShots, 7 + away_goals * 3 + (seed + 1) % 3)
        .with_stat(Feature::HomeShotsOnTarget, 2 + home_goals + seed % 2)
        .with_stat(Feature::AwayShotsOnTarget, 2 + away_goals)
        .with_stat(Feature::HomeCorners, 3 + seed % 5)
        .with_stat(Feature::AwayCorners, 2 + (seed * 3) % 5)
        .with_stat(Feature::HomeFouls, 10 + seed % 6)
        .with_stat(Feature::AwayFouls, 11 + (seed * 2) % 7)
        .with_stat(Feature::HomeYellowCards, 1 + seed % 3)
        .with_stat(Feature::AwayYellowCards, 2 + (seed + 2) % 3)
        .with_stat(Feature::HomeRedCards, u32::from(seed % 7 == 0))
        .with_stat(Feature::AwayRedCards, 0);
    base.with_score(home_goals, away_goals)
}

/// The twelve head-to-head fixtures, alternating venues.
pub fn scenario_matches() -> Vec<MatchRecord> {
    SCENARIO_HOME_GOALS
        .iter()
        .zip(SCENARIO_AWAY_GOALS.iter())
        .enumerate()
        .map(|(i, (&h, &a))| {
            let date = NaiveDate::from_ymd_opt(2019 + i as i32 / 2, 3 + (i as u32 % 2) * 6, 10).unwrap();
            let (home, away) = if i % 2 == 0 { (HOME, AWAY) } else { (AWAY, HOME) };
            full_record(home, away, date, h, a, i as u32)
        })
        .collect()
}

/// Head-to-head fixtures plus unrelated league games for both sides.
pub fn league_matches() -> Vec<MatchRecord> {
    let mut matches = scenario_matches();
    for (i, rival) in ["Valencia", "Getafe", "Osasuna"].iter().enumerate() {
        let date = NaiveDate::from_ymd_opt(2024, 4, 1 + i as u32).unwrap();
        matches.push(full_record(HOME, rival, date, 2, 1, 20 + i as u32));
        matches.push(full_record(rival, AWAY, date, 0, 1, 30 + i as u32));
    }
    matches
}

pub fn scenario_clustering() -> ClusteringConfig {
    ClusteringConfig {
        k_min: 2,
        k_max: 4,
        ..ClusteringConfig::default()
    }
}

pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        max_concurrent_builds: 4,
        retry_backoff: Duration::from_millis(5),
    }
}

pub fn seeded_dataset() -> Arc<InMemoryDataset> {
    let dataset = Arc::new(InMemoryDataset::new());
    dataset.set_matches(LEAGUE, league_matches());
    dataset
}

pub fn new_coordinator(
    dataset: Arc<dyn DatasetAccessor>,
    store: Arc<dyn ArtifactStore>,
    trainer: Arc<dyn ModelTrainer>,
) -> BuildCoordinator {
    BuildCoordinator::new(dataset, store, trainer, fast_config())
}

pub fn default_trainer() -> KMeansTrainer {
    KMeansTrainer::new(ClusteringEngine::new(scenario_clustering()), LabelThresholds::default())
}

/// Delegates to the real trainer and counts how often it ran.
pub struct CountingTrainer {
    inner: KMeansTrainer,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl CountingTrainer {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Holds each build open for `delay` so concurrent callers pile up.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: default_trainer(),
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most builds that were ever inside `train` at the same time.
    pub fn peak_concurrent(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ModelTrainer for CountingTrainer {
    fn train(&self, matches: &[MatchRecord], cluster_hint: Option<usize>) -> Result<TrainedModel, MatchupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = self.inner.train(matches, cluster_hint);
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub enum Failure {
    Numerical,
    Panic,
}

/// Runs the real pipeline, then fails before anything could be stored.
pub struct FailingTrainer {
    inner: KMeansTrainer,
    failure: Failure,
}

impl FailingTrainer {
    pub fn new(failure: Failure) -> Self {
        Self {
            inner: default_trainer(),
            failure,
        }
    }
}

impl ModelTrainer for FailingTrainer {
    fn train(&self, matches: &[MatchRecord], cluster_hint: Option<usize>) -> Result<TrainedModel, MatchupError> {
        self.inner.train(matches, cluster_hint)?;
        match self.failure {
            Failure::Numerical => Err(MatchupError::numerical("profile aggregation produced NaN")),
            Failure::Panic => panic!("profile generator crashed"),
        }
    }
}

/// In-memory store whose next `get`/`put` calls can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryArtifactStore,
    failing_puts: AtomicUsize,
    failing_gets: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_puts(&self, n: usize) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_gets(&self, n: usize) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn io_failure(op: &'static str, key: &str) -> StoreError {
    StoreError::Io {
        op,
        key: key.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, "device busy"),
    }
}

#[async_trait]
impl ArtifactStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<ArtifactBundle>, StoreError> {
        if Self::take(&self.failing_gets) {
            return Err(io_failure("read", key));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bundle: &ArtifactBundle) -> Result<(), StoreError> {
        if Self::take(&self.failing_puts) {
            return Err(io_failure("write", key));
        }
        self.inner.put(key, bundle).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.remove(key).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys().await
    }
}
