use nifty_charts::cache::ResultCache;
use nifty_charts::errors::AppError;
use nifty_charts::pipeline::Pipeline;
use nifty_charts::quotes::YahooChartSource;
use nifty_charts::storage_utils::AsyncStorageManager;
use nifty_charts::{summary, tui};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Step 1: Load Configuration
    println!("\n--- Step 1: Loading Configuration ---");
    let storage = Arc::new(AsyncStorageManager::new_relative("storage").await?);
    let config = storage.load_config().await?;
    if config.views.is_empty() {
        return Err(AppError::config("no views configured").into());
    }
    println!(
        "Config loaded from {:?} ({} views)",
        storage.base_dir,
        config.views.len()
    );

    let source = Arc::new(YahooChartSource::new(config.session_start_time()?)?);
    let first_view = config.views[0].clone();
    let pipeline = Pipeline {
        source,
        cache: Arc::new(Mutex::new(ResultCache::new(Duration::from_secs(
            first_view.ttl_secs,
        )))),
        storage: storage.clone(),
        thresholds: config.thresholds,
        fetch_delay: Duration::from_millis(config.fetch_delay_ms),
        epoch_cutoff: config.epoch_cutoff_time()?,
    };

    // Step 2: Preload the first view
    println!("\n--- Step 2: Fetching \"{}\" ---", first_view.name);
    let initial = match pipeline
        .run_view(&first_view, |done, total| {
            if done % 25 == 0 || done == total {
                println!("  fetched {done}/{total}");
            }
        })
        .await
    {
        Ok(data) => {
            println!(
                "Loaded {} tickers: {} rendered, {} skipped, {} failed",
                data.total,
                data.report.rendered,
                data.report.skipped,
                data.report.failed.len()
            );
            Some(data)
        }
        Err(e) => {
            eprintln!("Error loading view: {e}");
            None
        }
    };

    // Step 3: Interactive grid
    let app = tui::App::new(pipeline, config.views, initial);
    let final_data = tui::run_tui(app).await?;

    // Step 4: Summary table for whatever was on screen last
    if let Some(data) = final_data {
        clearscreen::clear()?;
        summary::print(&data);
    }

    Ok(())
}
