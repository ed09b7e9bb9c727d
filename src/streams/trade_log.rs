//! CSV journal of settled trades

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::trading_core::TradeHistoryItem;

#[derive(Debug, Serialize)]
struct TradeLogRow<'a> {
    timestamp: String,
    contract_id: &'a str,
    contract_type: &'a str,
    pattern: &'a str,
    entry: f64,
    exit: Option<f64>,
    profit: f64,
    result: String,
}

/// Appends one row per settled trade
pub struct TradeLogger {
    writer: csv::Writer<File>,
}

impl TradeLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open trade log {}", path.display()))?;

        // Header only for a fresh file
        let is_empty = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);

        Ok(Self { writer })
    }

    pub fn log(&mut self, trade: &TradeHistoryItem) -> Result<()> {
        let contract_type = trade.contract_type.map(|t| t.code()).unwrap_or("");
        self.writer.serialize(TradeLogRow {
            timestamp: trade.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            contract_id: &trade.id,
            contract_type,
            pattern: trade.pattern.map(|p| p.label()).unwrap_or("MANUAL"),
            entry: trade.entry,
            exit: trade.exit,
            profit: trade.profit,
            result: trade.result.to_string(),
        })?;
        self.writer.flush()?;
        Ok(())
    }
}
