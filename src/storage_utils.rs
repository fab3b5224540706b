use crate::errors::AppError;
use crate::quotes::{Interval, Period};
use crate::trend::TrendThresholds;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

// --- Configuration ---

/// Where one view's symbols come from.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewSource {
    /// Newline-delimited ticker file.
    TickerFile { path: PathBuf },
    /// Directory holding `*gainers*.csv` / `*loosers*.csv` exports; the
    /// newest of each is used.
    GainersLosers { dir: PathBuf },
}

/// One dashboard view. The old per-page scripts collapse into this struct:
/// interval, lookback, whether to bucket by trend, and the symbol source.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ViewConfig {
    pub name: String,
    pub interval: Interval,
    pub period: Period,
    pub trend_grouping: bool,
    /// Cache TTL for this view's fetches, seconds.
    pub ttl_secs: u64,
    /// Cap on grid slots; `None` shows every ticker ("show all" on).
    #[serde(default)]
    pub max_charts: Option<usize>,
    pub source: ViewSource,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub views: Vec<ViewConfig>,
    pub thresholds: TrendThresholds,
    /// Pause between consecutive provider calls, to stay under throttling.
    pub fetch_delay_ms: u64,
    /// Daily cache rollover time, IST ("15:45" = shortly after market close).
    pub epoch_cutoff: String,
    /// Intraday session open, IST; earlier ticks are cut.
    pub session_start: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let tickers = ViewSource::TickerFile {
            path: PathBuf::from("data/tickers_Nifty500.txt"),
        };
        AppConfig {
            views: vec![
                ViewConfig {
                    name: "2Y Daily".to_string(),
                    interval: Interval::D1,
                    period: Period::Y2,
                    trend_grouping: true,
                    ttl_secs: 24 * 3600,
                    max_charts: None,
                    source: tickers.clone(),
                },
                ViewConfig {
                    name: "5Y Weekly".to_string(),
                    interval: Interval::W1,
                    period: Period::Y5,
                    trend_grouping: true,
                    ttl_secs: 24 * 3600,
                    max_charts: None,
                    source: tickers.clone(),
                },
                ViewConfig {
                    name: "Intraday 5m".to_string(),
                    interval: Interval::M5,
                    period: Period::D1,
                    trend_grouping: true,
                    ttl_secs: 900,
                    max_charts: None,
                    source: tickers,
                },
                ViewConfig {
                    name: "Gainers & Losers 1m".to_string(),
                    interval: Interval::M1,
                    period: Period::D1,
                    trend_grouping: false,
                    ttl_secs: 30,
                    max_charts: None,
                    source: ViewSource::GainersLosers {
                        dir: PathBuf::from("data/top-gain-loosers"),
                    },
                },
            ],
            thresholds: TrendThresholds::default(),
            fetch_delay_ms: 200,
            epoch_cutoff: "15:45".to_string(),
            session_start: "09:15".to_string(),
        }
    }
}

impl AppConfig {
    pub fn epoch_cutoff_time(&self) -> Result<NaiveTime, AppError> {
        parse_clock(&self.epoch_cutoff, "epoch_cutoff")
    }

    pub fn session_start_time(&self) -> Result<NaiveTime, AppError> {
        parse_clock(&self.session_start, "session_start")
    }
}

fn parse_clock(value: &str, field: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| AppError::config(format!("{field} {value:?}: {e}")))
}

// --- Storage ---

/// JSON file storage with atomic writes. Holds the config, and date-stamped
/// snapshots of fetched series so a restarted process skips refetching.
pub struct AsyncStorageManager {
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Storage directory resolved relative to the running binary.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new_at(base_dir).await
    }

    pub async fn new_at<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Write through a temp file and rename, so a crash mid-write leaves the
    /// previous file intact.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let file_name = format!("{filename}.json");
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{file_name}.tmp"));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;
        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{filename}.json"));
        let content = fs::read(path).await?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Load the config file, writing defaults on first run so there is a
    /// file to edit.
    pub async fn load_config(&self) -> anyhow::Result<AppConfig> {
        match self.load::<AppConfig>("config").await {
            Ok(config) => Ok(config),
            Err(_) => {
                let config = AppConfig::default();
                self.save("config", &config).await?;
                Ok(config)
            }
        }
    }
}
