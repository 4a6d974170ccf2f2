use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::Trade;

/// Append-only CSV log of closed trades. The header is written once when
/// the file is created and stays stable across restarts. Appends from
/// concurrent monitors serialize on an internal lock.
pub struct TradeLog {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct LogRow<'a> {
    mode: String,
    date: &'a str,
    entry_time: &'a str,
    exit_time: &'a str,
    option: String,
    side: String,
    qty: u32,
    entry_price: f64,
    exit_price: Option<f64>,
    pnl: Option<f64>,
    identifier: &'a str,
    order_id: &'a str,
}

impl TradeLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, trade: &Trade) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let needs_header = std::fs::metadata(&self.path).map_or(true, |m| m.len() == 0);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open trade log {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);

        writer
            .serialize(LogRow {
                mode: trade.mode.to_string(),
                date: &trade.date,
                entry_time: &trade.entry_time,
                exit_time: trade.exit_time.as_deref().unwrap_or(""),
                option: trade.option_descriptor(),
                side: trade.side.to_string(),
                qty: trade.qty,
                entry_price: trade.entry_price,
                exit_price: trade.exit_price,
                pnl: trade.pnl,
                identifier: &trade.identifier,
                order_id: trade.order_id.as_deref().unwrap_or(""),
            })
            .context("serialize trade log row")?;
        writer.flush().context("flush trade log")?;
        Ok(())
    }

    /// Number of data rows currently in the log.
    pub fn row_count(&self) -> usize {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match csv::Reader::from_path(&self.path) {
            Ok(mut reader) => reader.records().filter(|r| r.is_ok()).count(),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionSide;
    use crate::test_helpers::{make_trade, temp_path};

    #[test]
    fn header_written_once_across_reopens() {
        let path = temp_path("trade_log_header.csv");
        let _ = std::fs::remove_file(&path);

        let log = TradeLog::new(&path);
        let mut trade = make_trade("id-1", OptionSide::Call, 100.0, 2);
        trade.exit_price = Some(113.0);
        trade.pnl = Some(26.0);
        log.append(&trade).unwrap();

        // Reopen the log as a fresh process would
        let log2 = TradeLog::new(&path);
        log2.append(&trade).unwrap();
        assert_eq!(log2.row_count(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let headers: Vec<&str> = content
            .lines()
            .filter(|l| l.starts_with("mode,"))
            .collect();
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn unknown_exit_leaves_empty_cells() {
        let path = temp_path("trade_log_unknown.csv");
        let _ = std::fs::remove_file(&path);

        let log = TradeLog::new(&path);
        let trade = make_trade("id-1", OptionSide::Put, 100.0, 2);
        log.append(&trade).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let data_line = content.lines().nth(1).unwrap();
        assert!(data_line.contains(",,"));
    }
}
