//! The per-view pipeline: resolve symbols, fetch each series through the
//! cache, classify trends, and prepare the chart grid.
//!
//! One bad symbol never aborts a batch. Fetch failures and empty payloads are
//! recorded per symbol and surfaced in the report; the whole view fails only
//! when every single fetch errors out.

use crate::cache::{FetchKey, FetchOutcome, ResultCache, cache_epoch};
use crate::charts::{ChartSlot, TickerChart};
use crate::errors::AppError;
use crate::quotes::{PriceSeries, QuoteSource, now_ist};
use crate::storage_utils::{AsyncStorageManager, ViewConfig, ViewSource};
use crate::tickers::{self, Symbol};
use crate::trend::{self, TrendGroup, TrendThresholds};
use chrono::NaiveTime;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Classifying,
    Rendered,
    Failed,
}

#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub state: PipelineState,
    /// Symbols that produced a drawable chart.
    pub rendered: usize,
    /// Symbols skipped: empty series or a chart that failed to build.
    pub skipped: usize,
    /// Symbols whose fetch errored, in input order.
    pub failed: Vec<Symbol>,
}

#[derive(Debug)]
pub struct ChartGroup {
    pub title: String,
    pub slots: Vec<ChartSlot>,
}

/// Everything one refresh pass produced, ready for the grid.
#[derive(Debug)]
pub struct ViewData {
    pub view_name: String,
    pub epoch: String,
    pub total: usize,
    pub groups: Vec<ChartGroup>,
    pub report: PipelineReport,
}

/// The orchestrator. Owns nothing mutable itself; the cache is shared and
/// locked for the whole pass, which serializes duplicate-key fetches.
#[derive(Clone)]
pub struct Pipeline {
    pub source: Arc<dyn QuoteSource>,
    pub cache: Arc<Mutex<ResultCache>>,
    pub storage: Arc<AsyncStorageManager>,
    pub thresholds: TrendThresholds,
    pub fetch_delay: Duration,
    pub epoch_cutoff: NaiveTime,
}

struct SymbolList {
    title: Option<String>,
    symbols: Vec<Symbol>,
}

impl Pipeline {
    pub async fn run_view(
        &self,
        view: &ViewConfig,
        progress: impl Fn(usize, usize) + Send + Sync,
    ) -> Result<ViewData, AppError> {
        let lists = resolve_symbols(&view.source)?;
        let total: usize = lists.iter().map(|l| l.symbols.len()).sum();
        let epoch = cache_epoch(now_ist(), self.epoch_cutoff);

        // An empty ticker list means nothing to render, not a failure.
        if total == 0 {
            return Ok(ViewData {
                view_name: view.name.clone(),
                epoch,
                total,
                groups: Vec::new(),
                report: PipelineReport {
                    state: PipelineState::Rendered,
                    rendered: 0,
                    skipped: 0,
                    failed: Vec::new(),
                },
            });
        }

        // Daily and weekly views keep a per-epoch snapshot on disk so a
        // restarted process does not refetch the whole list.
        let snapshot_name = (!view.interval.is_intraday())
            .then(|| format!("snapshot-{}-{}", slug(&view.name), epoch));
        let mut snapshot: HashMap<Symbol, PriceSeries> = match &snapshot_name {
            Some(name) => self.storage.load(name).await.unwrap_or_default(),
            None => HashMap::new(),
        };

        // --- Loading ---

        let mut cache = self.cache.lock().await;
        cache.set_ttl(Duration::from_secs(view.ttl_secs));

        let mut fetched: Vec<(usize, Symbol, FetchOutcome)> = Vec::with_capacity(total);
        let mut done = 0;
        for (list_idx, list) in lists.iter().enumerate() {
            for symbol in &list.symbols {
                let key = FetchKey {
                    symbol: symbol.clone(),
                    interval: view.interval,
                    period: view.period,
                    epoch: epoch.clone(),
                };
                let outcome = match snapshot.get(symbol) {
                    Some(series) => {
                        cache.insert(key, series.clone());
                        FetchOutcome::Series(series.clone())
                    }
                    None => match cache.peek(&key) {
                        Some(outcome) => outcome,
                        None => {
                            let outcome = cache.get_or_fetch(key, &*self.source).await;
                            // Pace only actual provider calls.
                            if !self.fetch_delay.is_zero() {
                                tokio::time::sleep(self.fetch_delay).await;
                            }
                            outcome
                        }
                    },
                };
                if let FetchOutcome::Series(series) = &outcome {
                    if !series.is_empty() {
                        snapshot.insert(symbol.clone(), series.clone());
                    }
                }
                fetched.push((list_idx, symbol.clone(), outcome));
                done += 1;
                progress(done, total);
            }
        }
        drop(cache);

        if let Some(name) = &snapshot_name {
            if !snapshot.is_empty() {
                // Snapshot write failures are not worth aborting a render over.
                let _ = self.storage.save(name, &snapshot).await;
            }
        }

        let failed: Vec<Symbol> = fetched
            .iter()
            .filter(|(_, _, outcome)| matches!(outcome, FetchOutcome::Failed(_)))
            .map(|(_, symbol, _)| symbol.clone())
            .collect();
        if failed.len() == total {
            return Ok(ViewData {
                view_name: view.name.clone(),
                epoch,
                total,
                groups: Vec::new(),
                report: PipelineReport {
                    state: PipelineState::Failed,
                    rendered: 0,
                    skipped: 0,
                    failed,
                },
            });
        }

        // --- Classifying ---

        // The old "show all charts" toggle: when off, only the first few
        // grid slots are kept.
        if let Some(max) = view.max_charts {
            fetched.truncate(max);
        }

        let mut rendered = 0;
        let mut skipped = 0;
        let mut slots: Vec<(usize, ChartSlot)> = Vec::with_capacity(total);
        for (list_idx, symbol, outcome) in fetched {
            let slot = match outcome {
                // Failed fetches are already counted in `failed`; they get a
                // placeholder but do not inflate `skipped`.
                FetchOutcome::Failed(cause) => ChartSlot::Missing {
                    symbol,
                    reason: cause,
                },
                FetchOutcome::Series(series) if series.is_empty() => {
                    skipped += 1;
                    ChartSlot::Missing {
                        symbol,
                        reason: "no data".to_string(),
                    }
                }
                FetchOutcome::Series(series) => {
                    let (group, angle) = if view.trend_grouping {
                        trend::classify(&series, &self.thresholds)
                    } else {
                        (TrendGroup::Neutral, None)
                    };
                    match TickerChart::build(symbol, &series, view.interval, group, angle) {
                        Ok(chart) => {
                            rendered += 1;
                            ChartSlot::Chart(chart)
                        }
                        Err(AppError::Render { symbol, reason }) => {
                            skipped += 1;
                            ChartSlot::Missing { symbol, reason }
                        }
                        Err(other) => return Err(other),
                    }
                }
            };
            slots.push((list_idx, slot));
        }

        let groups = if view.trend_grouping {
            group_by_trend(slots)
        } else {
            group_by_list(&lists, slots)
        };

        Ok(ViewData {
            view_name: view.name.clone(),
            epoch,
            total,
            groups,
            report: PipelineReport {
                state: PipelineState::Rendered,
                rendered,
                skipped,
                failed,
            },
        })
    }
}

fn resolve_symbols(source: &ViewSource) -> Result<Vec<SymbolList>, AppError> {
    match source {
        ViewSource::TickerFile { path } => Ok(vec![SymbolList {
            title: None,
            symbols: tickers::load(path)?,
        }]),
        ViewSource::GainersLosers { dir } => {
            let gainers = tickers::newest_csv(dir, "gainers").ok_or_else(|| {
                AppError::config(format!("no *gainers*.csv found in {}", dir.display()))
            })?;
            let losers = tickers::newest_csv(dir, "loosers").ok_or_else(|| {
                AppError::config(format!("no *loosers*.csv found in {}", dir.display()))
            })?;
            Ok(vec![
                SymbolList {
                    title: Some("Top Gainers".to_string()),
                    symbols: tickers::load_syms(&gainers)?,
                },
                SymbolList {
                    title: Some("Top Losers".to_string()),
                    symbols: tickers::load_syms(&losers)?,
                },
            ])
        }
    }
}

/// Trend views bucket charts into ascending/descending/neutral in a fixed
/// order; symbols with nothing to draw go into a trailing "No Data" group.
/// Input order is preserved inside every group.
fn group_by_trend(slots: Vec<(usize, ChartSlot)>) -> Vec<ChartGroup> {
    let mut ascending = Vec::new();
    let mut descending = Vec::new();
    let mut neutral = Vec::new();
    let mut missing = Vec::new();
    for (_, slot) in slots {
        let bucket = match &slot {
            ChartSlot::Chart(chart) => Some(chart.group),
            ChartSlot::Missing { .. } => None,
        };
        match bucket {
            Some(TrendGroup::Ascending) => ascending.push(slot),
            Some(TrendGroup::Descending) => descending.push(slot),
            Some(TrendGroup::Neutral) => neutral.push(slot),
            None => missing.push(slot),
        }
    }
    let mut groups = vec![
        ChartGroup {
            title: "Ascending".to_string(),
            slots: ascending,
        },
        ChartGroup {
            title: "Descending".to_string(),
            slots: descending,
        },
        ChartGroup {
            title: "Neutral".to_string(),
            slots: neutral,
        },
    ];
    if !missing.is_empty() {
        groups.push(ChartGroup {
            title: "No Data".to_string(),
            slots: missing,
        });
    }
    groups
}

/// Non-trend views keep the caller's list structure: one group per input
/// list, placeholders inline where a symbol had nothing to draw.
fn group_by_list(lists: &[SymbolList], slots: Vec<(usize, ChartSlot)>) -> Vec<ChartGroup> {
    let mut groups: Vec<ChartGroup> = lists
        .iter()
        .map(|list| ChartGroup {
            title: list
                .title
                .clone()
                .unwrap_or_else(|| "All Tickers".to_string()),
            slots: Vec::new(),
        })
        .collect();
    for (list_idx, slot) in slots {
        groups[list_idx].slots.push(slot);
    }
    groups
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::{Interval, Period, PricePoint, ist};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::io::Write;

    /// Stub source: symbols starting with "TCS" get a 3-point ascending
    /// series, "FAIL" symbols error, everything else comes back empty.
    struct StubSource;

    #[async_trait]
    impl QuoteSource for StubSource {
        async fn fetch(
            &self,
            symbol: &Symbol,
            _interval: Interval,
            _period: Period,
        ) -> Result<PriceSeries, AppError> {
            if symbol.as_str().starts_with("FAIL") {
                return Err(AppError::fetch(symbol, "stub outage"));
            }
            if symbol.as_str().starts_with("TCS") {
                let tz = ist();
                let points = (0..3)
                    .map(|i| PricePoint {
                        ts: tz.timestamp_opt(1_750_000_000 + 60 * i, 0).unwrap(),
                        close: 100.0 + i as f64,
                    })
                    .collect();
                return Ok(PriceSeries::new(points));
            }
            Ok(PriceSeries::empty())
        }
    }

    async fn pipeline(dir: &std::path::Path, source: Arc<dyn QuoteSource>) -> Pipeline {
        Pipeline {
            source,
            cache: Arc::new(Mutex::new(ResultCache::new(Duration::from_secs(600)))),
            storage: Arc::new(AsyncStorageManager::new_at(dir).await.unwrap()),
            thresholds: TrendThresholds::default(),
            fetch_delay: Duration::ZERO,
            epoch_cutoff: NaiveTime::from_hms_opt(15, 45, 0).unwrap(),
        }
    }

    fn ticker_view(path: std::path::PathBuf) -> ViewConfig {
        ViewConfig {
            name: "2Y Daily".to_string(),
            interval: Interval::D1,
            period: Period::Y2,
            trend_grouping: true,
            ttl_secs: 600,
            max_charts: None,
            source: ViewSource::TickerFile { path },
        }
    }

    fn write_tickers(lines: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{lines}").unwrap();
        file
    }

    #[tokio::test]
    async fn two_ticker_scenario_renders_one_and_skips_one() {
        let storage_dir = tempfile::tempdir().unwrap();
        let tickers = write_tickers("TCS\nINFY.NS\n");
        let pipeline = pipeline(storage_dir.path(), Arc::new(StubSource)).await;

        let data = pipeline
            .run_view(&ticker_view(tickers.path().to_path_buf()), |_, _| {})
            .await
            .unwrap();

        assert_eq!(data.total, 2);
        assert_eq!(data.report.state, PipelineState::Rendered);
        assert_eq!(data.report.rendered, 1);
        assert_eq!(data.report.skipped, 1);
        assert!(data.report.failed.is_empty());

        let ascending = &data.groups[0];
        assert_eq!(ascending.title, "Ascending");
        assert_eq!(ascending.slots.len(), 1);
        match &ascending.slots[0] {
            ChartSlot::Chart(chart) => {
                assert_eq!(chart.symbol.as_str(), "TCS.NS");
                assert!(chart.angle.unwrap().is_finite());
            }
            ChartSlot::Missing { .. } => panic!("expected a chart for TCS.NS"),
        }

        let no_data = data.groups.last().unwrap();
        assert_eq!(no_data.title, "No Data");
        assert_eq!(no_data.slots[0].symbol().as_str(), "INFY.NS");
    }

    #[tokio::test]
    async fn all_fetches_failing_fails_the_view() {
        let storage_dir = tempfile::tempdir().unwrap();
        let tickers = write_tickers("FAILONE\nFAILTWO\n");
        let pipeline = pipeline(storage_dir.path(), Arc::new(StubSource)).await;

        let data = pipeline
            .run_view(&ticker_view(tickers.path().to_path_buf()), |_, _| {})
            .await
            .unwrap();

        assert_eq!(data.report.state, PipelineState::Failed);
        assert_eq!(data.report.failed.len(), 2);
        assert!(data.groups.is_empty());
    }

    #[tokio::test]
    async fn one_failure_among_successes_is_only_a_warning() {
        let storage_dir = tempfile::tempdir().unwrap();
        let tickers = write_tickers("TCS\nFAILONE\n");
        let pipeline = pipeline(storage_dir.path(), Arc::new(StubSource)).await;

        let data = pipeline
            .run_view(&ticker_view(tickers.path().to_path_buf()), |_, _| {})
            .await
            .unwrap();

        assert_eq!(data.report.state, PipelineState::Rendered);
        assert_eq!(data.report.rendered, 1);
        // A failed fetch counts once, under `failed`, not under `skipped`.
        assert_eq!(data.report.skipped, 0);
        assert_eq!(data.report.failed.len(), 1);
        assert_eq!(data.report.failed[0].as_str(), "FAILONE.NS");
    }

    #[tokio::test]
    async fn max_charts_caps_the_grid() {
        let storage_dir = tempfile::tempdir().unwrap();
        let tickers = write_tickers("TCS\nTCSTWO\nTCSTHREE\n");
        let pipeline = pipeline(storage_dir.path(), Arc::new(StubSource)).await;

        let view = ViewConfig {
            max_charts: Some(1),
            ..ticker_view(tickers.path().to_path_buf())
        };
        let data = pipeline.run_view(&view, |_, _| {}).await.unwrap();

        assert_eq!(data.total, 3);
        assert_eq!(data.report.rendered, 1);
        let slots: usize = data.groups.iter().map(|g| g.slots.len()).sum();
        assert_eq!(slots, 1);
        assert_eq!(data.groups[0].slots[0].symbol().as_str(), "TCS.NS");
    }

    #[tokio::test]
    async fn empty_ticker_file_renders_nothing_gracefully() {
        let storage_dir = tempfile::tempdir().unwrap();
        let tickers = write_tickers("\n\n");
        let pipeline = pipeline(storage_dir.path(), Arc::new(StubSource)).await;

        let data = pipeline
            .run_view(&ticker_view(tickers.path().to_path_buf()), |_, _| {})
            .await
            .unwrap();

        assert_eq!(data.report.state, PipelineState::Rendered);
        assert_eq!(data.total, 0);
        assert!(data.groups.is_empty());
    }

    #[tokio::test]
    async fn missing_ticker_file_is_a_configuration_error() {
        let storage_dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(storage_dir.path(), Arc::new(StubSource)).await;

        let err = pipeline
            .run_view(
                &ticker_view(std::path::PathBuf::from("/nonexistent/tickers.txt")),
                |_, _| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn gainers_and_losers_views_keep_list_grouping() {
        let storage_dir = tempfile::tempdir().unwrap();
        let csv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            csv_dir.path().join("T20-gainers-25-Jun.csv"),
            "SYMBOL\ntcs\n",
        )
        .unwrap();
        std::fs::write(
            csv_dir.path().join("T20-loosers-25-Jun.csv"),
            "SYMBOL\ninfy\n",
        )
        .unwrap();

        let view = ViewConfig {
            name: "Gainers & Losers 1m".to_string(),
            interval: Interval::M1,
            period: Period::D1,
            trend_grouping: false,
            ttl_secs: 30,
            max_charts: None,
            source: ViewSource::GainersLosers {
                dir: csv_dir.path().to_path_buf(),
            },
        };
        let pipeline = pipeline(storage_dir.path(), Arc::new(StubSource)).await;
        let data = pipeline.run_view(&view, |_, _| {}).await.unwrap();

        assert_eq!(data.groups.len(), 2);
        assert_eq!(data.groups[0].title, "Top Gainers");
        assert_eq!(data.groups[1].title, "Top Losers");
        assert_eq!(data.groups[0].slots[0].symbol().as_str(), "TCS.NS");
        // INFY.NS came back empty and stays inline as a placeholder.
        assert!(matches!(
            data.groups[1].slots[0],
            ChartSlot::Missing { .. }
        ));
    }

    #[tokio::test]
    async fn daily_snapshot_survives_a_source_outage() {
        let storage_dir = tempfile::tempdir().unwrap();
        let tickers = write_tickers("TCS\n");
        let view = ticker_view(tickers.path().to_path_buf());

        let warm = pipeline(storage_dir.path(), Arc::new(StubSource)).await;
        let first = warm.run_view(&view, |_, _| {}).await.unwrap();
        assert_eq!(first.report.rendered, 1);

        // Same storage, fresh cache, and a source that now always errors:
        // the snapshot keeps the view alive.
        struct DownSource;
        #[async_trait]
        impl QuoteSource for DownSource {
            async fn fetch(
                &self,
                symbol: &Symbol,
                _interval: Interval,
                _period: Period,
            ) -> Result<PriceSeries, AppError> {
                Err(AppError::fetch(symbol, "connection refused"))
            }
        }
        let cold = pipeline(storage_dir.path(), Arc::new(DownSource)).await;
        let second = cold.run_view(&view, |_, _| {}).await.unwrap();
        assert_eq!(second.report.state, PipelineState::Rendered);
        assert_eq!(second.report.rendered, 1);
    }

    #[tokio::test]
    async fn progress_reaches_the_total() {
        let storage_dir = tempfile::tempdir().unwrap();
        let tickers = write_tickers("TCS\nINFY\nRELIANCE\n");
        let pipeline = pipeline(storage_dir.path(), Arc::new(StubSource)).await;

        let seen = std::sync::Mutex::new(Vec::new());
        pipeline
            .run_view(&ticker_view(tickers.path().to_path_buf()), |done, total| {
                seen.lock().unwrap().push((done, total));
            })
            .await
            .unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.last(), Some(&(3, 3)));
    }
}
