//! Alert deduplication
//!
//! One cooldown clock per symbol, shared by every detector: a streak alert
//! and a drift alert on the same symbol count against the same window.

use crate::config::AlertConfig;
use crate::types::Symbol;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks when each symbol last fired
#[derive(Debug)]
pub struct CooldownGate {
    /// Symbol -> last alert instant
    last_fired: HashMap<Symbol, Instant>,
    window: Duration,
    suppressed: u64,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            last_fired: HashMap::new(),
            window,
            suppressed: 0,
        }
    }

    pub fn from_config(config: &AlertConfig) -> Self {
        Self::new(config.cooldown())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether `symbol` may alert at `now`; a `true` answer records `now`
    pub fn should_fire(&mut self, symbol: &Symbol, now: Instant) -> bool {
        if self.is_cooling_down(symbol, now) {
            self.suppressed += 1;
            return false;
        }
        self.last_fired.insert(symbol.clone(), now);
        true
    }

    /// Read-only check, state is untouched
    pub fn is_cooling_down(&self, symbol: &Symbol, now: Instant) -> bool {
        match self.last_fired.get(symbol) {
            Some(last) => now.saturating_duration_since(*last) < self.window,
            None => false,
        }
    }

    pub fn last_fired(&self, symbol: &Symbol) -> Option<Instant> {
        self.last_fired.get(symbol).copied()
    }

    /// Symbols that have fired at least once
    pub fn tracked_count(&self) -> usize {
        self.last_fired.len()
    }

    /// Rejected `should_fire` calls since creation
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }
}
