// src/export.rs
//! CSV dumps of fetched price series and raw stream messages.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;

use crate::ingest::types::{PredictionSignal, PricePoint, StreamMessage};

/// Lets spreadsheet apps detect UTF-8 in the stream dump.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn prices_filename(ticker: &str) -> String {
    format!("prices_{ticker}.csv")
}

pub fn stream_filename(ticker: &str, days: u32) -> String {
    format!("stream_{ticker}_{days}days.csv")
}

/// Format: date,open,high,low,close,volume (newest first)
pub fn write_prices<W: Write>(out: W, points: &[PricePoint]) -> Result<()> {
    let mut writer = Writer::from_writer(out);
    writer.write_record(["date", "open", "high", "low", "close", "volume"])?;

    let mut sorted: Vec<&PricePoint> = points.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));

    for p in sorted {
        writer.write_record(&[
            p.date.format("%Y-%m-%d").to_string(),
            p.open.to_string(),
            p.high.to_string(),
            p.low.to_string(),
            p.close.to_string(),
            p.volume.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Format: stream_id,date,username,content,sentiment_label,prediction_signal,likes,replies
///
/// `sentiment_label` is the platform's own label, not the classifier bucket.
pub fn write_stream<W: Write>(out: W, messages: &[StreamMessage]) -> Result<()> {
    let mut writer = Writer::from_writer(out);
    writer.write_record([
        "stream_id",
        "date",
        "username",
        "content",
        "sentiment_label",
        "prediction_signal",
        "likes",
        "replies",
    ])?;
    for m in messages {
        writer.write_record(&[
            m.id.clone(),
            m.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            m.author.clone(),
            m.content.clone(),
            m.platform_label.clone(),
            m.prediction_signal.as_str().to_string(),
            m.likes.to_string(),
            m.replies.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `prices_<TICKER>.csv` into `dir`.
pub fn save_prices(dir: &Path, ticker: &str, points: &[PricePoint]) -> Result<PathBuf> {
    let path = dir.join(prices_filename(ticker));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    write_prices(file, points)?;
    Ok(path)
}

/// Writes `stream_<TICKER>_<days>days.csv` into `dir`, BOM-prefixed.
pub fn save_stream(
    dir: &Path,
    ticker: &str,
    days: u32,
    messages: &[StreamMessage],
) -> Result<PathBuf> {
    let path = dir.join(stream_filename(ticker, days));
    let mut file = File::create(&path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    file.write_all(UTF8_BOM)?;
    write_stream(file, messages)?;
    Ok(path)
}

/// Count of messages carrying each target-price direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalTally {
    pub bullish_targets: usize,
    pub bearish_targets: usize,
}

pub fn tally_signals(messages: &[StreamMessage]) -> SignalTally {
    messages
        .iter()
        .fold(SignalTally::default(), |mut acc, m| {
            match m.prediction_signal {
                PredictionSignal::BullishTarget => acc.bullish_targets += 1,
                PredictionSignal::BearishTarget => acc.bearish_targets += 1,
                PredictionSignal::None => {}
            }
            acc
        })
}
