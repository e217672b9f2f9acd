// src/ingest/types.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One daily candle. Unique by `date` within a series handed out by the fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Direction implied by a target-price quote embedded in a stream message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSignal {
    #[default]
    None,
    BullishTarget,
    BearishTarget,
}

impl PredictionSignal {
    /// Compare a quoted target with the last price at posting time.
    /// Absent or non-positive values carry no signal.
    pub fn from_quote(last_price: Option<f64>, target_price: Option<f64>) -> Self {
        match (last_price, target_price) {
            (Some(last), Some(target)) if last > 0.0 && target > 0.0 => {
                if target > last {
                    Self::BullishTarget
                } else if target < last {
                    Self::BearishTarget
                } else {
                    Self::None
                }
            }
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BullishTarget => "bullish_target",
            Self::BearishTarget => "bearish_target",
        }
    }
}

/// A single post from the ticker's social stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Upstream-assigned id, display/export only.
    pub id: String,
    pub created_at: NaiveDateTime,
    pub author: String,
    pub content: String,
    /// Label attached by the platform itself (advisory).
    pub platform_label: String,
    pub prediction_signal: PredictionSignal,
    pub likes: u64,
    pub replies: u64,
}

static TICKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9.\-]{1,12}$").expect("ticker regex compiles"));

/// Trim + uppercase; `None` when the result is not a plausible symbol.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let t = raw.trim().to_ascii_uppercase();
    TICKER_RE.is_match(&t).then_some(t)
}

/// Parse upstream timestamps into UTC-naive values.
///
/// Accepts RFC 3339 (offset applied, then dropped), naive `YYYY-MM-DD HH:MM:SS[.f]`
/// with either separator, and a bare calendar day (midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Calendar day of a price row; tolerates a trailing time component.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    s.get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        .or_else(|| parse_timestamp(s).map(|dt| dt.date()))
}

/// Numbers sometimes arrive as strings; anything else becomes `None`.
pub(crate) fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }))
}

pub(crate) fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(lenient_f64(d)?
        .filter(|x| x.is_finite() && *x >= 0.0)
        .map(|x| x as u64)
        .unwrap_or(0))
}

/// Ids and cursors are opaque: keep strings as-is, render numbers, drop the rest.
pub(crate) fn opaque_token(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn signal_follows_target_vs_last() {
        use PredictionSignal as P;
        assert_eq!(P::from_quote(Some(100.0), Some(120.0)), P::BullishTarget);
        assert_eq!(P::from_quote(Some(100.0), Some(80.0)), P::BearishTarget);
        assert_eq!(P::from_quote(Some(100.0), Some(0.0)), P::None);
        assert_eq!(P::from_quote(Some(0.0), Some(120.0)), P::None);
        assert_eq!(P::from_quote(Some(100.0), Some(100.0)), P::None);
        assert_eq!(P::from_quote(None, Some(120.0)), P::None);
        assert_eq!(P::from_quote(Some(-5.0), Some(120.0)), P::None);
    }

    #[test]
    fn timestamps_in_common_shapes() {
        assert_eq!(
            parse_timestamp("2025-03-04T10:15:00+07:00"),
            Some(ymd_hms(2025, 3, 4, 3, 15, 0))
        );
        assert_eq!(
            parse_timestamp("2025-03-04T10:15:00Z"),
            Some(ymd_hms(2025, 3, 4, 10, 15, 0))
        );
        assert_eq!(
            parse_timestamp("2025-03-04 10:15:00"),
            Some(ymd_hms(2025, 3, 4, 10, 15, 0))
        );
        assert_eq!(
            parse_timestamp("2025-03-04T10:15:00.250"),
            Some(
                NaiveDate::from_ymd_opt(2025, 3, 4)
                    .unwrap()
                    .and_hms_milli_opt(10, 15, 0, 250)
                    .unwrap()
            )
        );
        assert_eq!(parse_timestamp("2025-03-04"), Some(ymd_hms(2025, 3, 4, 0, 0, 0)));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("  "), None);
    }

    #[test]
    fn day_ignores_time_suffix() {
        let d = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(parse_day("2024-12-31"), Some(d));
        assert_eq!(parse_day("2024-12-31T00:00:00+07:00"), Some(d));
        assert_eq!(parse_day("31/12/2024"), None);
    }

    #[test]
    fn ticker_normalization() {
        assert_eq!(normalize_ticker(" bbca "), Some("BBCA".to_string()));
        assert_eq!(normalize_ticker("BRK.B"), Some("BRK.B".to_string()));
        assert_eq!(normalize_ticker(""), None);
        assert_eq!(normalize_ticker("BB CA"), None);
        assert_eq!(normalize_ticker("../etc"), None);
    }

    #[test]
    fn opaque_tokens_accept_numbers_and_strings() {
        let n = serde_json::json!(12345);
        let s = serde_json::json!(" abc ");
        let e = serde_json::json!("");
        assert_eq!(opaque_token(Some(&n)).as_deref(), Some("12345"));
        assert_eq!(opaque_token(Some(&s)).as_deref(), Some("abc"));
        assert_eq!(opaque_token(Some(&e)), None);
        assert_eq!(opaque_token(Some(&Value::Null)), None);
        assert_eq!(opaque_token(None), None);
    }
}
