use crate::errors::AppError;
use crate::quotes::{Interval, Period, PriceSeries, QuoteSource};
use crate::tickers::Symbol;
use chrono::{DateTime, Days, FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Everything that identifies one fetch. A new epoch date produces a new key,
/// which is what forces exactly one fresh fetch per trading day.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchKey {
    pub symbol: Symbol,
    pub interval: Interval,
    pub period: Period,
    pub epoch: String,
}

/// What a fetch produced. Failures are cached too (negative caching), so a
/// symbol the provider rejects is not hammered on every redraw.
#[derive(Clone, Debug)]
pub enum FetchOutcome {
    Series(PriceSeries),
    Failed(String),
}

struct CacheEntry {
    stored_at: Instant,
    outcome: FetchOutcome,
}

/// Memoizes fetch results by key with a wall-clock TTL. Callers hold this
/// behind a mutex when refreshes can overlap, which also gives the
/// at-most-one-fetch-per-key guarantee.
pub struct ResultCache {
    ttl: Duration,
    entries: HashMap<FetchKey, CacheEntry>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        ResultCache {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// The cached outcome, only if present and within the TTL. Lets callers
    /// skip their inter-request pacing on hits.
    pub fn peek(&self, key: &FetchKey) -> Option<FetchOutcome> {
        self.entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.outcome.clone())
    }

    /// Returns the cached outcome when fresh, otherwise calls the source
    /// exactly once and stores whatever came back, empty series included.
    /// The entry is written whole after the fetch returns, never partially.
    pub async fn get_or_fetch(&mut self, key: FetchKey, source: &dyn QuoteSource) -> FetchOutcome {
        if let Some(entry) = self.entries.get(&key) {
            if entry.stored_at.elapsed() < self.ttl {
                return entry.outcome.clone();
            }
        }

        let outcome = match source.fetch(&key.symbol, key.interval, key.period).await {
            Ok(series) => FetchOutcome::Series(series),
            Err(e) => FetchOutcome::Failed(e.to_string()),
        };
        self.entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                outcome: outcome.clone(),
            },
        );
        outcome
    }

    /// Seed an entry without fetching, e.g. from a snapshot file.
    pub fn insert(&mut self, key: FetchKey, series: PriceSeries) {
        self.entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                outcome: FetchOutcome::Series(series),
            },
        );
    }
}

/// Cache epoch for daily views: today's ISO date once IST civil time reaches
/// the post-close cutoff, yesterday's before that.
pub fn cache_epoch(now: DateTime<FixedOffset>, cutoff: NaiveTime) -> String {
    let date = if now.time() >= cutoff {
        now.date_naive()
    } else {
        now.date_naive()
            .checked_sub_days(Days::new(1))
            .unwrap_or_else(|| now.date_naive())
    };
    date.format("%Y-%m-%d").to_string()
}
