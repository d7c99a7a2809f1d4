//! Cumulative price drift against a per-symbol baseline

use crate::config::DriftConfig;
use crate::strategy::CooldownGate;
use crate::types::{Direction, DriftEvent, Symbol, TickerSnapshot};
use std::collections::{BTreeSet, HashMap};
use tokio::time::Instant;
use tracing::debug;

/// Remembers one reference price per symbol.
///
/// The baseline only moves when an event fires, so a slow walk of many
/// small steps still trips the threshold eventually.
#[derive(Debug)]
pub struct DriftDetector {
    threshold_pct: f64,
    baselines: HashMap<Symbol, f64>,
}

impl DriftDetector {
    pub fn new(threshold_pct: f64) -> Self {
        Self {
            threshold_pct,
            baselines: HashMap::new(),
        }
    }

    pub fn from_config(config: &DriftConfig) -> Self {
        Self::new(config.threshold_pct)
    }

    pub fn baseline(&self, symbol: &Symbol) -> Option<f64> {
        self.baselines.get(symbol).copied()
    }

    pub fn tracked(&self) -> usize {
        self.baselines.len()
    }

    /// Compare the ticker with its baseline.
    ///
    /// Fires only if the move exceeds the threshold and `gate` lets the
    /// symbol through; firing rebases to the ticker price.
    pub fn observe(
        &mut self,
        ticker: &TickerSnapshot,
        gate: &mut CooldownGate,
        now: Instant,
    ) -> Option<DriftEvent> {
        let price = ticker.last_price;
        if !price.is_finite() || price <= 0.0 {
            return None;
        }

        let Some(&baseline) = self.baselines.get(&ticker.symbol) else {
            self.baselines.insert(ticker.symbol.clone(), price);
            return None;
        };

        let change_percent = (price - baseline).abs() / baseline * 100.0;
        if change_percent <= self.threshold_pct {
            return None;
        }

        if !gate.should_fire(&ticker.symbol, now) {
            debug!(
                "{}: drift {:.2}% suppressed by cooldown",
                ticker.symbol, change_percent
            );
            return None;
        }

        self.baselines.insert(ticker.symbol.clone(), price);

        Some(DriftEvent {
            symbol: ticker.symbol.clone(),
            from_price: baseline,
            to_price: price,
            change_percent,
            direction: if price >= baseline {
                Direction::Up
            } else {
                Direction::Down
            },
        })
    }

    /// Forget symbols that left the universe
    pub fn retain(&mut self, universe: &BTreeSet<Symbol>) {
        self.baselines.retain(|symbol, _| universe.contains(symbol));
    }
}
