use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use matchup_models::{MatchRecord, MatchupError};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("league not found: {league}")]
    LeagueNotFound { league: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        league: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse {
        league: String,
        path: PathBuf,
        reason: String,
    },
}

impl DatasetError {
    pub fn league(&self) -> &str {
        match self {
            Self::LeagueNotFound { league } | Self::Io { league, .. } | Self::Parse { league, .. } => league,
        }
    }
}

impl From<DatasetError> for MatchupError {
    fn from(err: DatasetError) -> Self {
        MatchupError::Dataset {
            league: err.league().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Read-only view of the historical matches of each league.
#[async_trait]
pub trait DatasetAccessor: Send + Sync {
    async fn get_matches(&self, league: &str) -> Result<Vec<MatchRecord>, DatasetError>;

    /// Moment of the last write to the league's data. Any write must move it forward.
    async fn get_last_modified(&self, league: &str) -> Result<DateTime<Utc>, DatasetError>;
}

#[derive(Debug, Clone)]
struct LeagueData {
    matches: Vec<MatchRecord>,
    last_modified: DateTime<Utc>,
}

/// Mutable in-process dataset, used by tests and embedding callers.
#[derive(Debug, Default)]
pub struct InMemoryDataset {
    leagues: RwLock<HashMap<String, LeagueData>>,
}

impl InMemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_matches(&self, league: &str, matches: impl IntoIterator<Item = MatchRecord>) {
        let mut leagues = self.leagues.write();
        let entry = leagues.entry(league.to_string()).or_insert_with(|| LeagueData {
            matches: Vec::new(),
            last_modified: DateTime::<Utc>::MIN_UTC,
        });
        entry.matches.extend(matches);
        entry.last_modified = advance(entry.last_modified);
    }

    pub fn set_matches(&self, league: &str, matches: Vec<MatchRecord>) {
        let mut leagues = self.leagues.write();
        let previous = leagues
            .get(league)
            .map(|l| l.last_modified)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        leagues.insert(
            league.to_string(),
            LeagueData {
                matches,
                last_modified: advance(previous),
            },
        );
    }

    /// Marks the league as written without changing its matches.
    pub fn touch(&self, league: &str) {
        if let Some(data) = self.leagues.write().get_mut(league) {
            data.last_modified = advance(data.last_modified);
        }
    }

    pub fn set_last_modified(&self, league: &str, at: DateTime<Utc>) {
        if let Some(data) = self.leagues.write().get_mut(league) {
            data.last_modified = at;
        }
    }
}

/// Wall-clock now, bumped past `previous` when the clock has not moved.
fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[async_trait]
impl DatasetAccessor for InMemoryDataset {
    async fn get_matches(&self, league: &str) -> Result<Vec<MatchRecord>, DatasetError> {
        self.leagues
            .read()
            .get(league)
            .map(|l| l.matches.clone())
            .ok_or_else(|| DatasetError::LeagueNotFound {
                league: league.to_string(),
            })
    }

    async fn get_last_modified(&self, league: &str) -> Result<DateTime<Utc>, DatasetError> {
        self.leagues
            .read()
            .get(league)
            .map(|l| l.last_modified)
            .ok_or_else(|| DatasetError::LeagueNotFound {
                league: league.to_string(),
            })
    }
}

/// Folder name of a league: lower-case, accents folded, spaces as `-`.
pub fn league_slug(league: &str) -> String {
    league
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}

/// Leagues stored as `<root>/<league_slug>/*.json`, each file a JSON array of matches.
#[derive(Debug, Clone)]
pub struct JsonDirectoryDataset {
    root: PathBuf,
}

impl JsonDirectoryDataset {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn league_dir(&self, league: &str) -> PathBuf {
        self.root.join(league_slug(league))
    }

    async fn league_files(&self, league: &str) -> Result<Vec<PathBuf>, DatasetError> {
        let dir = self.league_dir(league);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DatasetError::LeagueNotFound {
                    league: league.to_string(),
                })
            }
            Err(source) => return Err(io_error(league, &dir, source)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(league, &dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn io_error(league: &str, path: &Path, source: std::io::Error) -> DatasetError {
    DatasetError::Io {
        league: league.to_string(),
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl DatasetAccessor for JsonDirectoryDataset {
    async fn get_matches(&self, league: &str) -> Result<Vec<MatchRecord>, DatasetError> {
        let mut matches = Vec::new();
        for path in self.league_files(league).await? {
            let bytes = fs::read(&path).await.map_err(|e| io_error(league, &path, e))?;
            let records: Vec<MatchRecord> = serde_json::from_slice(&bytes).map_err(|e| DatasetError::Parse {
                league: league.to_string(),
                path: path.clone(),
                reason: e.to_string(),
            })?;
            debug!(league, file = %path.display(), records = records.len(), "Loaded match file");
            matches.extend(records);
        }
        Ok(matches)
    }

    async fn get_last_modified(&self, league: &str) -> Result<DateTime<Utc>, DatasetError> {
        let dir = self.league_dir(league);
        let dir_modified = fs::metadata(&dir)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| io_error(league, &dir, e))?;

        // Directory mtime covers deleted and renamed files.
        let mut latest: SystemTime = dir_modified;
        for path in self.league_files(league).await? {
            let modified = fs::metadata(&path)
                .await
                .and_then(|m| m.modified())
                .map_err(|e| io_error(league, &path, e))?;
            latest = latest.max(modified);
        }
        Ok(DateTime::<Utc>::from(latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(home: &str, away: &str) -> MatchRecord {
        MatchRecord::new(home, away, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()).with_score(1, 0)
    }

    #[test]
    fn test_league_slug() {
        assert_eq!(league_slug("Serie A"), "serie-a");
        assert_eq!(league_slug("  Liga Española "), "liga-espanola");
        assert_eq!(league_slug("premier"), "premier");
    }

    #[tokio::test]
    async fn test_in_memory_mutations_advance_last_modified() {
        let dataset = InMemoryDataset::new();
        assert!(matches!(
            dataset.get_matches("laliga").await,
            Err(DatasetError::LeagueNotFound { .. })
        ));

        dataset.insert_matches("laliga", vec![record("Barcelona", "Sevilla")]);
        let first = dataset.get_last_modified("laliga").await.unwrap();
        dataset.touch("laliga");
        let second = dataset.get_last_modified("laliga").await.unwrap();
        assert!(second > first);

        dataset.insert_matches("laliga", vec![record("Sevilla", "Barcelona")]);
        assert!(dataset.get_last_modified("laliga").await.unwrap() > second);
        assert_eq!(dataset.get_matches("laliga").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_json_directory_reads_football_data_columns() {
        let root = std::env::temp_dir().join(format!("matchup-dataset-{}", uuid::Uuid::new_v4()));
        let dir = root.join("serie-a");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("2023.json"),
            r#"[{"HomeTeam":"Inter","AwayTeam":"Milan","Date":"2023-09-16",
                "FTHG":5,"FTAG":1,"HTHG":2,"HTAG":0,"HS":17,"AS":9,"HST":9,"AST":3,
                "HC":7,"AC":4,"HF":10,"AF":12,"HY":1,"AY":3,"HR":0,"AR":0}]"#,
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let dataset = JsonDirectoryDataset::new(&root);
        let matches = dataset.get_matches("Serie A").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].home_team, "Inter");
        assert_eq!(matches[0].stat(matchup_models::Feature::HomeGoals), Some(5));
        assert!(dataset.get_last_modified("Serie A").await.is_ok());

        assert!(matches!(
            dataset.get_matches("Ligue 1").await,
            Err(DatasetError::LeagueNotFound { .. })
        ));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_json_directory_parse_error_maps_to_dataset_failure() {
        let root = std::env::temp_dir().join(format!("matchup-dataset-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("laliga")).unwrap();
        std::fs::write(root.join("laliga").join("bad.json"), "{not json").unwrap();

        let err = JsonDirectoryDataset::new(&root).get_matches("laliga").await.unwrap_err();
        assert!(matches!(err, DatasetError::Parse { .. }));
        assert!(matches!(MatchupError::from(err), MatchupError::Dataset { .. }));

        let _ = std::fs::remove_dir_all(&root);
    }
}
