//! Converts a gainers/losers CSV export into a plain ticker list file, one
//! normalized `.NS` symbol per line.

use nifty_charts::tickers;
use std::collections::HashSet;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let input = PathBuf::from(
        args.next()
            .ok_or_else(|| anyhow::anyhow!("usage: prepare-tickers <input.csv> [output.txt]"))?,
    );
    let output = PathBuf::from(args.next().unwrap_or_else(|| "tickers_from_csv.txt".to_string()));

    let symbols = tickers::load_syms(&input)?;
    let mut seen = HashSet::new();
    let unique: Vec<_> = symbols
        .into_iter()
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect();

    let mut contents = String::new();
    for symbol in &unique {
        contents.push_str(symbol.as_str());
        contents.push('\n');
    }
    std::fs::write(&output, contents)?;

    println!("Saved {} tickers to {}", unique.len(), output.display());
    Ok(())
}
