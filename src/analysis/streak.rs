//! Directional candle streaks
//!
//! Walks the series backward from the newest candle and collects the
//! unbroken run of candles that moved the same way by more than the
//! threshold. The run cannot restart once broken.

use crate::candles::has_enough;
use crate::config::StreakConfig;
use crate::types::{Candle, Direction, StreakEvent, Symbol};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct StreakDetector {
    /// Exclusive: a move of exactly this size is flat
    threshold_pct: f64,
    min_length: usize,
}

impl Default for StreakDetector {
    fn default() -> Self {
        Self::from_config(&StreakConfig::default())
    }
}

impl StreakDetector {
    pub fn new(threshold_pct: f64, min_length: usize) -> Self {
        Self {
            threshold_pct: threshold_pct.abs(),
            min_length: min_length.max(1),
        }
    }

    pub fn from_config(config: &StreakConfig) -> Self {
        Self::new(config.threshold_pct, config.min_length)
    }

    fn classify(&self, percent_change: f64) -> Option<Direction> {
        if percent_change > self.threshold_pct {
            Some(Direction::Up)
        } else if percent_change < -self.threshold_pct {
            Some(Direction::Down)
        } else {
            None
        }
    }

    /// Streak ending at the newest complete candle, if long enough
    pub fn detect(&self, symbol: &Symbol, candles: &[Candle]) -> Option<StreakEvent> {
        if !has_enough(candles) {
            return None;
        }

        let mut newest_first = candles.iter().rev().filter(|c| c.complete);
        let newest = newest_first.next()?;
        let direction = self.classify(newest.percent_change)?;

        let mut magnitudes = VecDeque::from([newest.percent_change]);
        for candle in newest_first {
            if self.classify(candle.percent_change) != Some(direction) {
                break;
            }
            magnitudes.push_front(candle.percent_change);
        }

        if magnitudes.len() < self.min_length {
            return None;
        }

        Some(StreakEvent {
            symbol: symbol.clone(),
            direction,
            count: magnitudes.len(),
            magnitudes: magnitudes.into(),
        })
    }
}
