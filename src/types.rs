//! Core types shared by the scanner, detectors and notifier

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange instrument identifier, e.g. `BTC_USDT`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
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

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A fixed-duration price/volume bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    /// (close - open) / open * 100
    pub percent_change: f64,
    /// The bar's close boundary has passed
    pub complete: bool,
}

impl Candle {
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        close: f64,
        high: f64,
        low: f64,
        volume: f64,
        complete: bool,
    ) -> Self {
        let percent_change = if open > 0.0 {
            (close - open) / open * 100.0
        } else {
            0.0
        };
        Self {
            open_time,
            open,
            close,
            high,
            low,
            volume,
            percent_change,
            complete,
        }
    }
}

/// Last traded price of one symbol, produced once per poll tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSnapshot {
    pub symbol: Symbol,
    pub last_price: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn arrow(&self) -> &'static str {
        match self {
            Direction::Up => "📈",
            Direction::Down => "📉",
        }
    }
}

/// Consecutive same-direction candles beyond the magnitude threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreakEvent {
    pub symbol: Symbol,
    pub direction: Direction,
    /// Percent changes, oldest first
    pub magnitudes: Vec<f64>,
    pub count: usize,
}

/// Price moved beyond the drift threshold from its baseline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftEvent {
    pub symbol: Symbol,
    pub from_price: f64,
    pub to_price: f64,
    /// Absolute percent move from `from_price`
    pub change_percent: f64,
    pub direction: Direction,
}

/// Recent peak followed by a retracement on a volume spike and a bearish MA cross
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PumpDumpEvent {
    pub symbol: Symbol,
    pub peak_price: f64,
    pub now_price: f64,
    pub peak_to_now_percent: f64,
    pub volume_spike_ratio: f64,
    /// `None` when the funding source was unavailable
    pub funding_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionEvent {
    Streak(StreakEvent),
    Drift(DriftEvent),
    PumpDump(PumpDumpEvent),
}

impl DetectionEvent {
    pub fn symbol(&self) -> &Symbol {
        match self {
            DetectionEvent::Streak(e) => &e.symbol,
            DetectionEvent::Drift(e) => &e.symbol,
            DetectionEvent::PumpDump(e) => &e.symbol,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DetectionEvent::Streak(_) => "streak",
            DetectionEvent::Drift(_) => "drift",
            DetectionEvent::PumpDump(_) => "pump_dump",
        }
    }
}

impl From<StreakEvent> for DetectionEvent {
    fn from(e: StreakEvent) -> Self {
        DetectionEvent::Streak(e)
    }
}

impl From<DriftEvent> for DetectionEvent {
    fn from(e: DriftEvent) -> Self {
        DetectionEvent::Drift(e)
    }
}

impl From<PumpDumpEvent> for DetectionEvent {
    fn from(e: PumpDumpEvent) -> Self {
        DetectionEvent::PumpDump(e)
    }
}
