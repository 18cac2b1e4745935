use std::env;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use matchup_ml::{policy_from_name, ClusterCountPolicy, ClusteringConfig, LabelThresholds};
use matchup_services::{CoordinatorConfig, DEFAULT_FORM_WINDOW};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub dataset: DatasetConfig,
    pub workers: WorkersConfig,
    pub clustering: ClusteringSettings,
    pub labels: LabelThresholds,
    pub form: FormConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    pub max_concurrent_builds: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringSettings {
    pub k_min: usize,
    pub k_max: usize,
    pub seed: u64,
    pub max_iterations: u64,
    pub n_runs: usize,
    pub tolerance: f64,
    pub policy: String,
    pub penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    pub window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub retry_backoff_ms: u64,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let clustering = ClusteringConfig::default();
        let labels = LabelThresholds::default();

        let config = Config::builder()
            // Start with default values
            .set_default("store.root", "data/artifacts")?
            .set_default("dataset.root", "data/leagues")?
            .set_default("workers.max_concurrent_builds", 4)?
            .set_default("clustering.k_min", clustering.k_min as u64)?
            .set_default("clustering.k_max", clustering.k_max as u64)?
            .set_default("clustering.seed", clustering.seed)?
            .set_default("clustering.max_iterations", clustering.max_iterations)?
            .set_default("clustering.n_runs", clustering.n_runs as u64)?
            .set_default("clustering.tolerance", clustering.tolerance)?
            .set_default("clustering.policy", "max_pseudo_r2")?
            .set_default("clustering.penalty", 0.05)?
            .set_default("labels.draw_share", labels.draw_share)?
            .set_default("labels.dominant_share", labels.dominant_share)?
            .set_default("labels.high_scoring_goals", labels.high_scoring_goals)?
            .set_default("labels.defensive_goals", labels.defensive_goals)?
            .set_default("labels.physical_cards", labels.physical_cards)?
            .set_default("labels.physical_fouls", labels.physical_fouls)?
            .set_default("form.window", DEFAULT_FORM_WINDOW as u64)?
            .set_default("storage.retry_backoff_ms", 200)?
            // Add in settings from configuration file
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // MATCHUP_CLUSTERING__K_MAX=8 overrides clustering.k_max
            .add_source(Environment::with_prefix("MATCHUP").prefix_separator("_").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn clustering_config(&self) -> ClusteringConfig {
        ClusteringConfig {
            k_min: self.clustering.k_min,
            k_max: self.clustering.k_max,
            seed: self.clustering.seed,
            max_iterations: self.clustering.max_iterations,
            n_runs: self.clustering.n_runs,
            tolerance: self.clustering.tolerance,
        }
    }

    pub fn cluster_policy(&self) -> Result<Box<dyn ClusterCountPolicy>, ConfigError> {
        policy_from_name(&self.clustering.policy, self.clustering.penalty).ok_or_else(|| {
            ConfigError::Message(format!("unknown clustering.policy '{}'", self.clustering.policy))
        })
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_concurrent_builds: self.workers.max_concurrent_builds,
            retry_backoff: Duration::from_millis(self.storage.retry_backoff_ms),
        }
    }
}
