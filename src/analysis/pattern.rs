//! Pump-then-dump reversal pattern
//!
//! All of these must hold on the recent window:
//! 1. the highest high is not the newest candle
//! 2. the last close sits at least `retracement_pct` below that peak
//! 3. the last candle's volume is a multiple of the earlier average
//! 4. the short SMA of closes just crossed below the long SMA
//! 5. funding, when known, is at or below the ceiling

use super::sma;
use crate::config::PumpDumpConfig;
use crate::types::{Candle, PumpDumpEvent, Symbol};

/// Price/volume part of a pump-dump, before the funding check
#[derive(Debug, Clone, PartialEq)]
pub struct PumpDumpCandidate {
    pub peak_price: f64,
    pub now_price: f64,
    pub peak_to_now_percent: f64,
    pub volume_spike_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct PumpDumpAnalyzer {
    config: PumpDumpConfig,
}

impl Default for PumpDumpAnalyzer {
    fn default() -> Self {
        Self::new(PumpDumpConfig::default())
    }
}

impl PumpDumpAnalyzer {
    pub fn new(config: PumpDumpConfig) -> Self {
        Self { config }
    }

    /// Candles needed for a verdict: the peak window and both SMA pairs
    pub fn required_candles(&self) -> usize {
        self.config.window.max(self.config.long_ma + 1)
    }

    /// Check the price, volume and moving-average conditions
    pub fn evaluate(&self, candles: &[Candle]) -> Option<PumpDumpCandidate> {
        let cfg = &self.config;
        if candles.len() < self.required_candles() || cfg.window < 2 {
            return None;
        }

        let window = &candles[candles.len() - cfg.window..];
        let last = window.last()?;

        let mut peak_idx = 0;
        for (i, c) in window.iter().enumerate() {
            if c.high > window[peak_idx].high {
                peak_idx = i;
            }
        }
        if peak_idx == window.len() - 1 {
            return None;
        }
        let peak = window[peak_idx].high;
        if peak <= 0.0 {
            return None;
        }

        let peak_to_now_percent = (last.close - peak) / peak * 100.0;
        if peak_to_now_percent > cfg.retracement_pct {
            return None;
        }

        let baseline = &window[..window.len().saturating_sub(cfg.volume_exclude_last.max(1))];
        if baseline.is_empty() {
            return None;
        }
        let avg_volume = baseline.iter().map(|c| c.volume).sum::<f64>() / baseline.len() as f64;
        if avg_volume <= 0.0 {
            return None;
        }
        let volume_spike_ratio = last.volume / avg_volume;
        if volume_spike_ratio <= cfg.volume_spike_multiple {
            return None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let prev = &closes[..closes.len() - 1];
        let short_now = sma(&closes, cfg.short_ma)?;
        let long_now = sma(&closes, cfg.long_ma)?;
        let short_prev = sma(prev, cfg.short_ma)?;
        let long_prev = sma(prev, cfg.long_ma)?;
        let crossed_down = short_prev >= long_prev && short_now < long_now;
        if !crossed_down {
            return None;
        }

        Some(PumpDumpCandidate {
            peak_price: peak,
            now_price: last.close,
            peak_to_now_percent,
            volume_spike_ratio,
        })
    }

    /// Apply the funding condition; `None` funding never disqualifies
    pub fn confirm(
        &self,
        symbol: &Symbol,
        candidate: PumpDumpCandidate,
        funding_rate: Option<f64>,
    ) -> Option<PumpDumpEvent> {
        if let Some(rate) = funding_rate {
            if rate > self.config.funding_rate_ceiling {
                return None;
            }
        }

        Some(PumpDumpEvent {
            symbol: symbol.clone(),
            peak_price: candidate.peak_price,
            now_price: candidate.now_price,
            peak_to_now_percent: candidate.peak_to_now_percent,
            volume_spike_ratio: candidate.volume_spike_ratio,
            funding_rate,
        })
    }

    pub fn analyze(
        &self,
        symbol: &Symbol,
        candles: &[Candle],
        funding_rate: Option<f64>,
    ) -> Option<PumpDumpEvent> {
        let candidate = self.evaluate(candles)?;
        self.confirm(symbol, candidate, funding_rate)
    }
}
