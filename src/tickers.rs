use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Exchange suffix expected by the quote provider for NSE symbols.
pub const EXCHANGE_SUFFIX: &str = ".NS";

/// A normalized ticker symbol: uppercase, exchange suffix applied exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn normalize(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        if upper.ends_with(EXCHANGE_SUFFIX) {
            Symbol(upper)
        } else {
            Symbol(format!("{upper}{EXCHANGE_SUFFIX}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Load symbols from a text file, one per non-empty line, file order kept.
/// Duplicates are kept as well; callers dedupe if they care.
pub fn load(path: &Path) -> Result<Vec<Symbol>, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::config(format!("ticker file {}: {e}", path.display())))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Symbol::normalize)
        .collect())
}

/// Load symbols from the SYMBOL column of a gainers/losers CSV.
/// The header match is case-insensitive after trimming.
pub fn load_syms(path: &Path) -> Result<Vec<Symbol>, AppError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AppError::config(format!("CSV {}: {e}", path.display())))?;
    let headers = reader
        .headers()
        .map_err(|e| AppError::config(format!("CSV {}: {e}", path.display())))?
        .clone();
    let col = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("symbol"))
        .ok_or_else(|| AppError::config(format!("{} needs a SYMBOL column", path.display())))?;

    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AppError::config(format!("CSV {}: {e}", path.display())))?;
        if let Some(field) = record.get(col) {
            let field = field.trim();
            if !field.is_empty() {
                symbols.push(Symbol::normalize(field));
            }
        }
    }
    Ok(symbols)
}

/// Newest CSV in `dir` whose file name contains `marker`, by modification time.
pub fn newest_csv(dir: &Path, marker: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_lowercase(),
            None => continue,
        };
        if !name.ends_with(".csv") || !name.contains(marker) {
            continue;
        }
        let mtime = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => continue,
        };
        if best.as_ref().map_or(true, |(t, _)| mtime > *t) {
            best = Some((mtime, path));
        }
    }
    best.map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn normalize_uppercases_and_suffixes_once() {
        assert_eq!(Symbol::normalize("tcs").as_str(), "TCS.NS");
        assert_eq!(Symbol::normalize("INFY.NS").as_str(), "INFY.NS");
        assert_eq!(Symbol::normalize(" infy.ns ").as_str(), "INFY.NS");
    }

    #[test]
    fn load_keeps_file_order_and_duplicates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tcs\n\nINFY.NS\n  reliance  \ntcs").unwrap();
        let symbols = load(file.path()).unwrap();
        let names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, ["TCS.NS", "INFY.NS", "RELIANCE.NS", "TCS.NS"]);
    }

    #[test]
    fn load_missing_file_is_a_configuration_error() {
        let err = load(Path::new("/nonexistent/tickers.txt")).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn load_syms_matches_header_case_insensitively() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Rank, Symbol ,Change\n1,tcs,2.1\n2,infy,1.4").unwrap();
        let symbols = load_syms(file.path()).unwrap();
        let names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, ["TCS.NS", "INFY.NS"]);
    }

    #[test]
    fn load_syms_without_symbol_column_fails() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Rank,Name\n1,Tata").unwrap();
        let err = load_syms(file.path()).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn newest_csv_filters_by_marker_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("T20-gainers-25-Jun.csv"), "SYMBOL\ntcs\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::write(dir.path().join("T20-loosers-25-Jun.csv"), "SYMBOL\ninfy\n").unwrap();

        let found = newest_csv(dir.path(), "gainers").unwrap();
        assert!(found.to_string_lossy().contains("gainers"));
        assert!(newest_csv(dir.path(), "zzz").is_none());
    }
}
