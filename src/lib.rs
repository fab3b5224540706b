pub mod cache;
pub mod charts;
pub mod errors;
pub mod pipeline;
pub mod quotes;
pub mod storage_utils;
pub mod summary;
pub mod tickers;
pub mod trend;
pub mod tui;
