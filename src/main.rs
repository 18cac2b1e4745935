mod config;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use crate::config::AppConfig;
use matchup_ml::ClusteringEngine;
use matchup_services::{BuildCoordinator, KMeansTrainer, PredictorService};
use matchup_store::{FileArtifactStore, JsonDirectoryDataset};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: matchup-rs <league> <home team> <away team> [cluster count]";

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchup_rs=info,matchup_services=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (league, home, away, hint) = match args.as_slice() {
        [league, home, away] => (league, home, away, None),
        [league, home, away, k] => {
            let k: usize = k.parse().with_context(|| format!("invalid cluster count '{k}'"))?;
            (league, home, away, Some(k))
        }
        _ => bail!(USAGE),
    };

    let config = AppConfig::new()?;
    info!("✅ Configuration loaded successfully");
    info!("📂 Artifacts: {}", config.store.root.display());
    info!("📊 Leagues: {}", config.dataset.root.display());

    let dataset = Arc::new(JsonDirectoryDataset::new(&config.dataset.root));
    let store = Arc::new(FileArtifactStore::open(&config.store.root).await?);
    let engine = ClusteringEngine::new(config.clustering_config()).with_policy(config.cluster_policy()?);
    let trainer = Arc::new(KMeansTrainer::new(engine, config.labels.clone()));

    let coordinator = Arc::new(BuildCoordinator::new(
        dataset.clone(),
        store,
        trainer,
        config.coordinator_config(),
    ));
    let predictor = PredictorService::new(coordinator.clone(), dataset, config.form.window);

    info!("🚀 Resolving {} vs {} in {}", home, away, league);
    let exit = match predictor.resolve_profiles(league, home, away, hint).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            match predictor.predict_upcoming(league, home, away).await {
                Ok(prediction) => println!("{}", serde_json::to_string_pretty(&prediction)?),
                Err(e) => error!(kind = e.kind(), "❌ {}: {}", e.user_message(), e),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(anyhow::Error::new(e))
        }
    };

    coordinator.metrics().log_summary();
    exit
}
