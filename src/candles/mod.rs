//! Candle normalization
//!
//! Exchanges return klines either as arrays (`[t, volume, close, high, low, open]`)
//! or as objects (`{"t":..,"o":"..","c":".."}`), with numbers that may be
//! strings and timestamps in seconds or milliseconds. Everything is turned into
//! an ascending, de-duplicated series of complete [`Candle`]s here so detectors
//! never see the raw shape.

use crate::types::Candle;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Detectors ignore a symbol with fewer complete candles than this
pub const MIN_COMPLETE_CANDLES: usize = 3;

/// One kline row as received from the exchange
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawKline {
    Row(Vec<Value>),
    Object(KlineObject),
}

#[derive(Debug, Clone, Deserialize)]
pub struct KlineObject {
    pub t: Value,
    #[serde(default)]
    pub v: Option<Value>,
    pub c: Value,
    pub h: Value,
    pub l: Value,
    pub o: Value,
    /// Quote volume, used when `v` is missing
    #[serde(default)]
    pub sum: Option<Value>,
}

/// Parsed fields of a kline before the completeness check
#[derive(Debug, Clone, Copy, PartialEq)]
struct KlineFields {
    open_time: DateTime<Utc>,
    open: f64,
    close: f64,
    high: f64,
    low: f64,
    volume: f64,
}

impl RawKline {
    fn fields(&self) -> Option<KlineFields> {
        match self {
            RawKline::Object(k) => Some(KlineFields {
                open_time: to_timestamp(&k.t)?,
                open: to_f64(&k.o)?,
                close: to_f64(&k.c)?,
                high: to_f64(&k.h)?,
                low: to_f64(&k.l)?,
                volume: k
                    .v
                    .as_ref()
                    .or(k.sum.as_ref())
                    .and_then(to_f64)
                    .unwrap_or(0.0),
            }),
            // [t, volume, close, high, low, open, ...]
            RawKline::Row(cols) if cols.len() >= 6 => Some(KlineFields {
                open_time: to_timestamp(&cols[0])?,
                volume: to_f64(&cols[1]).unwrap_or(0.0),
                close: to_f64(&cols[2])?,
                high: to_f64(&cols[3])?,
                low: to_f64(&cols[4])?,
                open: to_f64(&cols[5])?,
            }),
            RawKline::Row(_) => None,
        }
    }
}

fn to_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Seconds or milliseconds since the epoch
fn to_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    let raw = to_f64(v)? as i64;
    if raw <= 0 {
        return None;
    }
    if raw >= 1_000_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

/// Turn raw rows into complete candles, oldest first.
///
/// A candle is complete once `now` has reached `open_time + bar`. Incomplete
/// and unparseable rows are dropped; a repeated timestamp keeps the last row.
pub fn normalize(raw: &[RawKline], bar: Duration, now: DateTime<Utc>) -> Vec<Candle> {
    let bar = match chrono::Duration::from_std(bar) {
        Ok(d) => d,
        Err(_) => return Vec::new(),
    };

    let mut by_time: BTreeMap<DateTime<Utc>, KlineFields> = BTreeMap::new();
    for row in raw {
        let Some(f) = row.fields() else {
            continue;
        };
        if f.open <= 0.0 {
            continue;
        }
        if now < f.open_time + bar {
            continue;
        }
        by_time.insert(f.open_time, f);
    }

    by_time
        .into_values()
        .map(|f| Candle::new(f.open_time, f.open, f.close, f.high, f.low, f.volume, true))
        .collect()
}

/// `true` when there are enough complete candles to run detectors on
pub fn has_enough(candles: &[Candle]) -> bool {
    candles.len() >= MIN_COMPLETE_CANDLES
}
