//! Poll loop tests against an in-memory market

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::candles::RawKline;
    use crate::error::{BotError, Result};
    use crate::notify::MockAlertSink;
    use crate::types::TickerSnapshot;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted market data; ticker responses are consumed one per call
    #[derive(Default)]
    struct FakeMarket {
        universe: Mutex<Option<BTreeSet<Symbol>>>,
        tickers: Mutex<VecDeque<Option<Vec<TickerSnapshot>>>>,
        candles: Mutex<HashMap<Symbol, Vec<RawKline>>>,
        funding: Mutex<Option<f64>>,
        universe_calls: AtomicUsize,
        ticker_calls: AtomicUsize,
        funding_calls: AtomicUsize,
    }

    impl FakeMarket {
        fn with_universe(symbols: &[&str]) -> Self {
            let market = Self::default();
            market.set_universe(symbols);
            market
        }

        fn set_universe(&self, symbols: &[&str]) {
            *self.universe.lock() = Some(symbols.iter().map(|s| Symbol::from(*s)).collect());
        }

        fn push_tickers(&self, prices: &[(&str, f64)]) {
            let snaps = prices
                .iter()
                .map(|&(s, p)| TickerSnapshot {
                    symbol: Symbol::from(s),
                    last_price: p,
                    observed_at: Utc::now(),
                })
                .collect();
            self.tickers.lock().push_back(Some(snaps));
        }

        fn push_ticker_failure(&self) {
            self.tickers.lock().push_back(None);
        }

        fn set_candles(&self, symbol: &str, rows: Vec<RawKline>) {
            self.candles.lock().insert(Symbol::from(symbol), rows);
        }
    }

    fn unavailable() -> BotError {
        BotError::Api {
            status: 503,
            message: "service unavailable".into(),
        }
    }

    #[async_trait]
    impl MarketDataSource for FakeMarket {
        async fn fetch_symbol_universe(&self) -> Result<BTreeSet<Symbol>> {
            self.universe_calls.fetch_add(1, Ordering::SeqCst);
            self.universe.lock().clone().ok_or_else(unavailable)
        }

        async fn fetch_tickers(&self) -> Result<Vec<TickerSnapshot>> {
            self.ticker_calls.fetch_add(1, Ordering::SeqCst);
            match self.tickers.lock().pop_front() {
                Some(Some(snaps)) => Ok(snaps),
                Some(None) => Err(unavailable()),
                None => Ok(Vec::new()),
            }
        }

        async fn fetch_candles(&self, symbol: &Symbol, _lookback: usize) -> Result<Vec<RawKline>> {
            Ok(self.candles.lock().get(symbol).cloned().unwrap_or_default())
        }

        async fn fetch_funding_rate(&self, _symbol: &Symbol) -> Result<Option<f64>> {
            self.funding_calls.fetch_add(1, Ordering::SeqCst);
            Ok(*self.funding.lock())
        }
    }

    /// One-minute klines an hour in the past: (open, close, high, volume)
    fn klines(rows: &[(f64, f64, f64, f64)]) -> Vec<RawKline> {
        let start = Utc::now().timestamp() - 3_600;
        rows.iter()
            .enumerate()
            .map(|(i, &(o, c, h, v))| {
                serde_json::from_value(json!({
                    "t": start + i as i64 * 60,
                    "v": v,
                    "o": o.to_string(),
                    "c": c.to_string(),
                    "h": h.to_string(),
                    "l": (o.min(c) - 1.0).to_string(),
                }))
                .unwrap()
            })
            .collect()
    }

    /// +2.5%, +2.1%, +3.0% after a flat candle
    fn up_streak() -> Vec<RawKline> {
        klines(&[
            (100.0, 100.0, 101.0, 10.0),
            (100.0, 102.5, 103.0, 10.0),
            (100.0, 102.1, 103.0, 10.0),
            (100.0, 103.0, 104.0, 10.0),
        ])
    }

    fn pump_and_dump() -> Vec<RawKline> {
        let mut closes = vec![100.0; 31];
        closes.extend([103.0, 106.0, 101.0, 80.0]);
        let mut prev = 100.0;
        let rows: Vec<(f64, f64, f64, f64)> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let o: f64 = prev;
                prev = c;
                let high = if i == 32 { 110.0 } else { o.max(c) + 1.0 };
                let volume = if i == closes.len() - 1 { 100.0 } else { 10.0 };
                (o, c, high, volume)
            })
            .collect();
        klines(&rows)
    }

    fn orchestrator(market: Arc<FakeMarket>, sink: MockAlertSink) -> PollOrchestrator {
        PollOrchestrator::new(&Config::default(), market, Arc::new(sink))
    }

    #[tokio::test(start_paused = true)]
    async fn test_streak_alert_then_cooldown() {
        let market = Arc::new(FakeMarket::with_universe(&["AAA_USDT"]));
        market.set_candles("AAA_USDT", up_streak());

        let mut sink = MockAlertSink::new();
        sink.expect_notify()
            .withf(|e| match e {
                DetectionEvent::Streak(s) => {
                    s.symbol.as_str() == "AAA_USDT" && s.count == 3 && s.magnitudes[2] > 2.9
                }
                _ => false,
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut orch = orchestrator(market.clone(), sink);
        let first = orch.run_cycle(None).await;
        assert_eq!(first.symbols_scanned, 1);
        assert_eq!(first.events_detected, 1);
        assert_eq!(first.alerts_sent, 1);
        assert_eq!(orch.state(), PollState::Idle);

        // same candles inside the 5s window
        let second = orch.run_cycle(None).await;
        assert_eq!(second.events_detected, 1);
        assert_eq!(second.suppressed, 1);
        assert_eq!(second.alerts_sent, 0);

        assert_eq!(orch.stats().cycles, 2);
        assert_eq!(orch.stats().alerts_sent, 1);
        assert_eq!(market.funding_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_fires_once_and_rebases() {
        let market = Arc::new(FakeMarket::with_universe(&["AAA_USDT"]));
        market.push_tickers(&[("AAA_USDT", 100.0)]);
        market.push_tickers(&[("AAA_USDT", 104.0)]);
        market.push_tickers(&[("AAA_USDT", 105.0)]);

        let mut sink = MockAlertSink::new();
        sink.expect_notify()
            .withf(|e| match e {
                DetectionEvent::Drift(d) => d.from_price == 100.0 && d.to_price == 104.0,
                _ => false,
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut orch = orchestrator(market, sink);
        let sym = Symbol::from("AAA_USDT");

        let report = orch.run_cycle(None).await;
        assert_eq!(report.events_detected, 0);
        // no candles for the symbol
        assert_eq!(report.no_data, 1);
        assert_eq!(orch.drift().baseline(&sym), Some(100.0));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(orch.run_cycle(None).await.alerts_sent, 1);
        assert_eq!(orch.drift().baseline(&sym), Some(104.0));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(orch.run_cycle(None).await.events_detected, 0);
        assert_eq!(orch.drift().baseline(&sym), Some(104.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_failure_is_noop_tick() {
        let market = Arc::new(FakeMarket::with_universe(&["AAA_USDT"]));
        market.push_ticker_failure();
        market.push_tickers(&[("AAA_USDT", 100.0)]);

        // any notify call would panic
        let mut orch = orchestrator(market.clone(), MockAlertSink::new());

        let report = orch.run_cycle(None).await;
        assert!(report.skipped);
        assert_eq!(report.symbols_scanned, 0);
        assert_eq!(orch.drift().tracked(), 0);

        let report = orch.run_cycle(None).await;
        assert!(!report.skipped);
        assert_eq!(orch.drift().tracked(), 1);

        assert_eq!(orch.stats().skipped_cycles, 1);
        // universe cached across ticks
        assert_eq!(market.universe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_universe_failure_without_cache() {
        let market = Arc::new(FakeMarket::default());
        let mut orch = orchestrator(market.clone(), MockAlertSink::new());

        let report = orch.run_cycle(None).await;
        assert!(report.skipped);
        assert_eq!(market.ticker_calls.load(Ordering::SeqCst), 0);

        // recovers on the next tick
        market.set_universe(&["AAA_USDT"]);
        assert!(!orch.run_cycle(None).await.skipped);
        assert_eq!(orch.universe().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_universe_refresh_prunes_baselines() {
        let market = Arc::new(FakeMarket::with_universe(&["AAA_USDT", "BBB_USDT"]));
        market.push_tickers(&[("AAA_USDT", 1.0), ("BBB_USDT", 2.0)]);
        market.push_tickers(&[("AAA_USDT", 1.0), ("BBB_USDT", 2.0)]);

        let mut orch = orchestrator(market.clone(), MockAlertSink::new());
        orch.run_cycle(None).await;
        assert_eq!(orch.drift().tracked(), 2);

        market.set_universe(&["BBB_USDT"]);
        tokio::time::advance(Duration::from_secs(301)).await;
        orch.run_cycle(None).await;

        assert_eq!(market.universe_calls.load(Ordering::SeqCst), 2);
        assert_eq!(orch.drift().tracked(), 1);
        assert!(orch.drift().baseline(&Symbol::from("AAA_USDT")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_shared_across_detectors() {
        let market = Arc::new(FakeMarket::with_universe(&["AAA_USDT"]));
        market.set_candles("AAA_USDT", up_streak());
        market.push_tickers(&[("AAA_USDT", 100.0)]);
        market.push_tickers(&[("AAA_USDT", 110.0)]);

        let mut sink = MockAlertSink::new();
        sink.expect_notify().times(2).returning(|_| Ok(()));
        let mut orch = orchestrator(market, sink);

        let first = orch.run_cycle(None).await;
        assert_eq!(first.alerts_sent, 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        // drift claims the slot first, the streak is then suppressed
        let second = orch.run_cycle(None).await;
        assert_eq!(second.events_detected, 2);
        assert_eq!(second.alerts_sent, 1);
        assert_eq!(second.suppressed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_is_not_fatal() {
        let market = Arc::new(FakeMarket::with_universe(&["AAA_USDT"]));
        market.set_candles("AAA_USDT", up_streak());

        let mut sink = MockAlertSink::new();
        sink.expect_notify()
            .times(1)
            .returning(|_| Err(BotError::Notify("telegram down".into())));
        let mut orch = orchestrator(market, sink);

        let first = orch.run_cycle(None).await;
        assert_eq!(first.failed, 1);
        assert_eq!(first.alerts_sent, 0);

        // the failed send still used the cooldown slot
        let second = orch.run_cycle(None).await;
        assert_eq!(second.suppressed, 1);
        assert_eq!(second.failed, 0);
        assert_eq!(orch.stats().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_dump_funding_gate() {
        let market = Arc::new(FakeMarket::with_universe(&["PUMP_USDT"]));
        market.set_candles("PUMP_USDT", pump_and_dump());
        let orch = orchestrator(market.clone(), MockAlertSink::new());
        let sym = Symbol::from("PUMP_USDT");

        let events = orch.scan_one(&sym).await.unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DetectionEvent::PumpDump(e) => {
                assert_eq!(e.peak_price, 110.0);
                assert_eq!(e.funding_rate, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        *market.funding.lock() = Some(0.01);
        assert!(orch.scan_one(&sym).await.unwrap().is_empty());
        assert_eq!(market.funding_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_one_without_data() {
        let market = Arc::new(FakeMarket::with_universe(&["AAA_USDT"]));
        market.set_candles("AAA_USDT", klines(&[(100.0, 101.0, 102.0, 1.0)]));
        let orch = orchestrator(market, MockAlertSink::new());

        assert!(orch.scan_one(&Symbol::from("AAA_USDT")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_between_ticks() {
        let market = Arc::new(FakeMarket::with_universe(&["AAA_USDT"]));
        let mut orch = orchestrator(market, MockAlertSink::new());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            orch.run(rx).await;
            orch
        });

        // ticks at 0s and 10s, stop lands mid-sleep
        tokio::time::sleep(Duration::from_secs(15)).await;
        tx.send(true).unwrap();

        let orch = handle.await.unwrap();
        assert_eq!(orch.stats().cycles, 2);
        assert_eq!(orch.state(), PollState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_stop_already_set() {
        let market = Arc::new(FakeMarket::with_universe(&["AAA_USDT"]));
        let mut orch = orchestrator(market.clone(), MockAlertSink::new());
        let (_tx, rx) = watch::channel(true);

        orch.run(rx).await;
        assert_eq!(orch.stats().cycles, 0);
        assert_eq!(market.universe_calls.load(Ordering::SeqCst), 0);
    }
}
