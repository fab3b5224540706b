use crate::errors::AppError;
use crate::quotes::{Interval, PriceSeries};
use crate::tickers::Symbol;
use crate::trend::TrendGroup;
use ratatui::{
    prelude::*,
    symbols,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
};

const X_LABELS: usize = 4;
const Y_LABELS: usize = 3;

/// Everything one grid cell needs, precomputed so the draw loop only borrows.
#[derive(Debug)]
pub struct TickerChart {
    pub symbol: Symbol,
    pub group: TrendGroup,
    pub angle: Option<f64>,
    pub title: String,
    points: Vec<(f64, f64)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
    x_labels: Vec<String>,
    y_labels: Vec<String>,
}

impl TickerChart {
    /// Turn a non-empty series into chart data. A non-finite close is a
    /// render failure for this one chart, not for the grid.
    pub fn build(
        symbol: Symbol,
        series: &PriceSeries,
        interval: Interval,
        group: TrendGroup,
        angle: Option<f64>,
    ) -> Result<Self, AppError> {
        if series.is_empty() {
            return Err(AppError::Render {
                symbol,
                reason: "empty series".to_string(),
            });
        }
        if series.points().iter().any(|p| !p.close.is_finite()) {
            return Err(AppError::Render {
                symbol,
                reason: "non-finite close price".to_string(),
            });
        }

        let points: Vec<(f64, f64)> = series
            .points()
            .iter()
            .map(|p| (p.ts.timestamp() as f64, p.close))
            .collect();

        let x_min = points.first().map_or(0.0, |p| p.0);
        let x_max = points.last().map_or(1.0, |p| p.0);
        let x_bounds = if x_min < x_max {
            [x_min, x_max]
        } else {
            [x_min, x_min + 1.0]
        };

        let mut y_min = f64::INFINITY;
        let mut y_max = f64::NEG_INFINITY;
        for &(_, y) in &points {
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
        let pad = ((y_max - y_min) * 0.05).max(y_max.abs() * 0.001).max(0.01);
        let y_bounds = [y_min - pad, y_max + pad];

        let time_format = if interval.is_intraday() {
            "%H:%M"
        } else {
            "%b %Y"
        };
        let x_labels = spaced_indices(series.len(), X_LABELS)
            .into_iter()
            .map(|i| series.points()[i].ts.format(time_format).to_string())
            .collect();
        let y_labels = (0..Y_LABELS)
            .map(|i| {
                let t = i as f64 / (Y_LABELS - 1) as f64;
                format!("{:.1}", y_bounds[0] + t * (y_bounds[1] - y_bounds[0]))
            })
            .collect();

        let title = match angle {
            Some(angle) => format!("{symbol}  {} {angle:.1}\u{b0}", group.label()),
            None => symbol.to_string(),
        };

        Ok(TickerChart {
            symbol,
            group,
            angle,
            title,
            points,
            x_bounds,
            y_bounds,
            x_labels,
            y_labels,
        })
    }

    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.1)
    }

    pub fn samples(&self) -> usize {
        self.points.len()
    }

    /// The widget borrows the precomputed data, so build once per refresh
    /// and render every frame.
    pub fn widget(&self) -> Chart<'_> {
        let color = match self.group {
            TrendGroup::Ascending => Color::Green,
            TrendGroup::Descending => Color::Red,
            TrendGroup::Neutral => Color::Cyan,
        };
        let dataset = Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(color))
            .data(&self.points);

        Chart::new(vec![dataset])
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(self.title.clone()),
            )
            .x_axis(
                Axis::default()
                    .style(Style::default().fg(Color::DarkGray))
                    .bounds(self.x_bounds)
                    .labels(self.x_labels.iter().map(|l| Span::raw(l.clone())).collect()),
            )
            .y_axis(
                Axis::default()
                    .style(Style::default().fg(Color::DarkGray))
                    .bounds(self.y_bounds)
                    .labels(self.y_labels.iter().map(|l| Span::raw(l.clone())).collect()),
            )
    }
}

/// One cell of the grid: a drawable chart, or the reason there is none.
#[derive(Debug)]
pub enum ChartSlot {
    Chart(TickerChart),
    Missing { symbol: Symbol, reason: String },
}

impl ChartSlot {
    pub fn symbol(&self) -> &Symbol {
        match self {
            ChartSlot::Chart(chart) => &chart.symbol,
            ChartSlot::Missing { symbol, .. } => symbol,
        }
    }
}

/// Placeholder cell for a symbol with no data, mirroring the chart border so
/// the grid stays visually aligned.
pub fn placeholder<'a>(title: String, message: String) -> Paragraph<'a> {
    Paragraph::new(message)
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(title))
}

fn spaced_indices(len: usize, want: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    if len <= want {
        return (0..len).collect();
    }
    (0..want)
        .map(|i| i * (len - 1) / (want - 1))
        .collect()
}
