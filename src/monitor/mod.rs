//! Poll loop
//!
//! One tick: universe (cached) + tickers → drift → per-symbol candle scan
//! through the rate-limited runner → cooldown gate → alert sink.

#[cfg(test)]
mod tests;

use crate::analysis::{DriftDetector, PumpDumpAnalyzer, StreakDetector};
use crate::candles;
use crate::client::MarketDataSource;
use crate::config::Config;
use crate::notify::AlertSink;
use crate::scheduler::{RateLimitedRunner, ResilientFetcher, RetryPolicy};
use crate::strategy::CooldownGate;
use crate::types::{DetectionEvent, Symbol};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
}

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Universe or tickers unavailable, nothing was analyzed
    pub skipped: bool,
    pub symbols_scanned: usize,
    /// Symbols without enough complete candles this tick
    pub no_data: usize,
    pub events_detected: usize,
    pub alerts_sent: usize,
    /// Events dropped by the cooldown gate
    pub suppressed: usize,
    /// Events the sink failed to deliver
    pub failed: usize,
}

/// Totals since start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub cycles: usize,
    pub skipped_cycles: usize,
    pub events_detected: usize,
    pub alerts_sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

impl MonitorStats {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        if report.skipped {
            self.skipped_cycles += 1;
        }
        self.events_detected += report.events_detected;
        self.alerts_sent += report.alerts_sent;
        self.suppressed += report.suppressed;
        self.failed += report.failed;
    }
}

/// Stateless per-symbol analysis shared by the runner tasks
struct CandleScan {
    streak: StreakDetector,
    pump_dump: PumpDumpAnalyzer,
    lookback: usize,
    bar: Duration,
}

/// What one symbol produced in the candle phase
struct SymbolScan {
    symbol: Symbol,
    has_data: bool,
    events: Vec<DetectionEvent>,
}

impl SymbolScan {
    fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            has_data: false,
            events: Vec::new(),
        }
    }
}

pub struct PollOrchestrator {
    source: Arc<dyn MarketDataSource>,
    sink: Arc<dyn AlertSink>,
    runner: RateLimitedRunner,
    fetcher: ResilientFetcher,
    scan: CandleScan,
    drift: DriftDetector,
    gate: CooldownGate,
    universe: BTreeSet<Symbol>,
    universe_fetched_at: Option<Instant>,
    universe_refresh: Duration,
    poll_interval: Duration,
    state: PollState,
    stats: MonitorStats,
}

impl PollOrchestrator {
    pub fn new(
        config: &Config,
        source: Arc<dyn MarketDataSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let lookback = config
            .exchange
            .candle_lookback
            .max(PumpDumpAnalyzer::new(config.pump_dump.clone()).required_candles());

        Self {
            source,
            sink,
            runner: RateLimitedRunner::from_config(&config.scheduler),
            fetcher: ResilientFetcher::new(RetryPolicy::from_config(&config.scheduler)),
            scan: CandleScan {
                streak: StreakDetector::from_config(&config.streak),
                pump_dump: PumpDumpAnalyzer::new(config.pump_dump.clone()),
                lookback,
                // validated at load
                bar: config
                    .exchange
                    .bar_duration()
                    .unwrap_or(Duration::from_secs(60)),
            },
            drift: DriftDetector::from_config(&config.drift),
            gate: CooldownGate::from_config(&config.alerts),
            universe: BTreeSet::new(),
            universe_fetched_at: None,
            universe_refresh: config.scheduler.universe_refresh(),
            poll_interval: config.scheduler.poll_interval(),
            state: PollState::Idle,
            stats: MonitorStats::default(),
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn universe(&self) -> &BTreeSet<Symbol> {
        &self.universe
    }

    pub fn drift(&self) -> &DriftDetector {
        &self.drift
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    /// Refetch the contract list now. On failure the cached list is kept.
    pub async fn refresh_universe(&mut self) -> bool {
        let source = &self.source;
        let Some(universe) = self
            .fetcher
            .fetch("universe", || source.fetch_symbol_universe())
            .await
        else {
            return false;
        };

        let previous = self.universe.len();
        self.drift.retain(&universe);
        self.universe = universe;
        self.universe_fetched_at = Some(Instant::now());
        info!(
            "Universe refreshed: {} symbols (was {})",
            self.universe.len(),
            previous
        );
        true
    }

    fn universe_is_stale(&self) -> bool {
        match self.universe_fetched_at {
            Some(at) => at.elapsed() >= self.universe_refresh,
            None => true,
        }
    }

    /// Run one tick. Never fails: missing inputs make it a no-op.
    pub async fn run_cycle(&mut self, stop: Option<&watch::Receiver<bool>>) -> CycleReport {
        self.state = PollState::Polling;
        let report = self.poll_once(stop).await;
        self.state = PollState::Idle;

        self.stats.record(&report);
        if report.skipped {
            error!("Cycle skipped: market data unavailable");
        } else {
            info!(
                "Cycle: {} scanned ({} without data), {} events, {} sent, {} suppressed, {} failed",
                report.symbols_scanned,
                report.no_data,
                report.events_detected,
                report.alerts_sent,
                report.suppressed,
                report.failed
            );
        }
        report
    }

    async fn poll_once(&mut self, stop: Option<&watch::Receiver<bool>>) -> CycleReport {
        let mut report = CycleReport::default();

        if self.universe_is_stale() && !self.refresh_universe().await {
            if self.universe_fetched_at.is_none() {
                report.skipped = true;
                return report;
            }
            warn!("Universe refresh failed, keeping {} cached symbols", self.universe.len());
        }

        let source = &self.source;
        let Some(tickers) = self
            .fetcher
            .fetch("tickers", || source.fetch_tickers())
            .await
        else {
            report.skipped = true;
            return report;
        };

        let suppressed_before = self.gate.suppressed_count();

        // Drift runs on this task; the gate is consulted per event
        let now = Instant::now();
        let mut pending: Vec<DetectionEvent> = Vec::new();
        for ticker in tickers.iter().filter(|t| self.universe.contains(&t.symbol)) {
            if let Some(event) = self.drift.observe(ticker, &mut self.gate, now) {
                pending.push(event.into());
            }
        }

        let symbols: Vec<Symbol> = self.universe.iter().cloned().collect();
        let scan = &self.scan;
        let fetcher = &self.fetcher;
        let results = self
            .runner
            .run_until(
                symbols,
                |symbol| scan_symbol(scan, source.as_ref(), fetcher, symbol),
                stop,
            )
            .await;

        let now = Instant::now();
        for result in results.into_iter().flatten() {
            report.symbols_scanned += 1;
            if !result.has_data {
                report.no_data += 1;
                continue;
            }
            for event in result.events {
                if self.gate.should_fire(&result.symbol, now) {
                    pending.push(event);
                } else {
                    debug!("{}: {} suppressed by cooldown", result.symbol, event.kind());
                }
            }
        }

        report.suppressed = (self.gate.suppressed_count() - suppressed_before) as usize;
        report.events_detected = pending.len() + report.suppressed;

        for event in &pending {
            match self.sink.notify(event).await {
                Ok(()) => report.alerts_sent += 1,
                Err(e) => {
                    warn!("Alert for {} ({}) not delivered: {}", event.symbol(), event.kind(), e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// One-off analysis of a single symbol, bypassing the cooldown gate
    pub async fn scan_one(&self, symbol: &Symbol) -> Option<Vec<DetectionEvent>> {
        let source = self.source.as_ref();
        let result = scan_symbol(&self.scan, source, &self.fetcher, symbol.clone()).await;
        result.has_data.then_some(result.events)
    }

    /// Poll until `stop` reads `true`
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) {
        info!(
            "Polling every {:?} (max {} in flight, one start per {:?})",
            self.poll_interval,
            self.runner.max_concurrent(),
            self.runner.min_spacing()
        );

        loop {
            if *stop.borrow() {
                break;
            }
            self.run_cycle(Some(&stop)).await;

            if !wait_next_tick(&mut stop, self.poll_interval).await {
                break;
            }
        }

        self.log_stats();
    }

    pub fn log_stats(&self) {
        let s = &self.stats;
        info!(
            "Monitor: {} cycles ({} skipped), {} events, {} alerts sent, {} suppressed, {} failed",
            s.cycles, s.skipped_cycles, s.events_detected, s.alerts_sent, s.suppressed, s.failed
        );
    }
}

/// Sleep one interval; `false` if the stop signal fired meanwhile
async fn wait_next_tick(stop: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = stop.changed() => {
                if changed.is_err() {
                    // nobody can stop us any more
                    (&mut sleep).await;
                    return true;
                }
                if *stop.borrow() {
                    info!("Stop requested");
                    return false;
                }
            }
        }
    }
}

async fn scan_symbol(
    scan: &CandleScan,
    source: &dyn MarketDataSource,
    fetcher: &ResilientFetcher,
    symbol: Symbol,
) -> SymbolScan {
    let label = format!("candles {}", symbol);
    let Some(raw) = fetcher
        .fetch(&label, || source.fetch_candles(&symbol, scan.lookback))
        .await
    else {
        return SymbolScan::empty(symbol);
    };

    let series = candles::normalize(&raw, scan.bar, Utc::now());
    if !candles::has_enough(&series) {
        debug!("{}: {} complete candles, skipping", symbol, series.len());
        return SymbolScan::empty(symbol);
    }

    let mut events = Vec::new();
    if let Some(event) = scan.streak.detect(&symbol, &series) {
        events.push(event.into());
    }

    if let Some(candidate) = scan.pump_dump.evaluate(&series) {
        let label = format!("funding {}", symbol);
        let funding = fetcher
            .fetch(&label, || source.fetch_funding_rate(&symbol))
            .await
            .flatten();
        if let Some(event) = scan.pump_dump.confirm(&symbol, candidate, funding) {
            events.push(event.into());
        } else {
            debug!("{}: pump-dump rejected by funding {:?}", symbol, funding);
        }
    }

    SymbolScan {
        symbol,
        has_data: true,
        events,
    }
}
