use crate::errors::AppError;
use crate::tickers::Symbol;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// IST (UTC+05:30). All timestamps are converted here at the fetch boundary
/// and stay in this offset downstream.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("IST offset is in range")
}

pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1wk")]
    W1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::D1 => "1d",
            Interval::W1 => "1wk",
        }
    }

    pub fn is_intraday(&self) -> bool {
        matches!(self, Interval::M1 | Interval::M5 | Interval::M15)
    }
}

/// Lookback span requested from the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "2y")]
    Y2,
    #[serde(rename = "5y")]
    Y5,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::D1 => "1d",
            Period::Y2 => "2y",
            Period::Y5 => "5y",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub ts: DateTime<FixedOffset>,
    pub close: f64,
}

/// Close prices for one symbol, one interval. Timestamps strictly increasing,
/// duplicates dropped keeping the first occurrence.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.ts);
        points.dedup_by_key(|p| p.ts);
        PriceSeries { points }
    }

    pub fn empty() -> Self {
        PriceSeries { points: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// Drop points before `start` on `day` (civil time in IST). Used to cut
    /// pre-market ticks from intraday series.
    pub fn from_session_start(self, day: chrono::NaiveDate, start: NaiveTime) -> Self {
        let session_open = NaiveDateTime::new(day, start);
        let points = self
            .points
            .into_iter()
            .filter(|p| p.ts.naive_local() >= session_open)
            .collect();
        PriceSeries { points }
    }
}

// --- Provider payload ---

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Deserialize, Debug)]
struct ChartEnvelope {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: ChartIndicators,
}

#[derive(Deserialize, Debug, Default)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Deserialize, Debug, Default)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Build a series from the raw chart payload. Null closes are skipped;
/// anything structurally missing yields an empty series, never an error.
fn series_from_chart(body: ChartResponse) -> PriceSeries {
    let Some(result) = body.chart.result.and_then(|mut r| {
        if r.is_empty() {
            None
        } else {
            Some(r.remove(0))
        }
    }) else {
        return PriceSeries::empty();
    };

    let Some(quote) = result.indicators.quote.first() else {
        return PriceSeries::empty();
    };

    let tz = ist();
    let points = result
        .timestamp
        .iter()
        .zip(quote.close.iter())
        .filter_map(|(&ts, close)| {
            let close = (*close)?;
            let utc = DateTime::from_timestamp(ts, 0)?;
            Some(PricePoint {
                ts: utc.with_timezone(&tz),
                close,
            })
        })
        .collect();

    PriceSeries::new(points)
}

/// Anything that can produce a price series for a symbol. The pipeline only
/// sees this trait, so tests can substitute a stub source.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        period: Period,
    ) -> Result<PriceSeries, AppError>;
}

/// Production source talking to the Yahoo v8 chart endpoint. One HTTP call
/// per invocation, no retries; rate limiting is the pipeline's concern.
pub struct YahooChartSource {
    client: Client,
    session_start: NaiveTime,
}

impl YahooChartSource {
    pub fn new(session_start: NaiveTime) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; nifty-charts)")
            .build()
            .map_err(|e| AppError::config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            session_start,
        })
    }
}

#[async_trait]
impl QuoteSource for YahooChartSource {
    async fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        period: Period,
    ) -> Result<PriceSeries, AppError> {
        let url = format!("{CHART_URL}/{symbol}");
        let response = self
            .client
            .get(&url)
            .query(&[("range", period.as_str()), ("interval", interval.as_str())])
            .send()
            .await
            .map_err(|e| AppError::fetch(symbol, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(symbol, format!("provider status {status}")));
        }

        // A malformed body is treated like an empty payload, not a failure.
        let series = match response.json::<ChartResponse>().await {
            Ok(body) => series_from_chart(body),
            Err(_) => PriceSeries::empty(),
        };

        if interval.is_intraday() {
            let today = now_ist().date_naive();
            return Ok(series.from_session_start(today, self.session_start));
        }
        Ok(series)
    }
}
