//! Exchange API clients
//!
//! - `gate`: Gate.io futures REST (contracts, tickers, candles, funding)

pub mod gate;

pub use gate::GateClient;

use crate::candles::RawKline;
use crate::error::Result;
use crate::types::{Symbol, TickerSnapshot};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Read-only market data the monitor polls
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Every tradable contract
    async fn fetch_symbol_universe(&self) -> Result<BTreeSet<Symbol>>;

    /// Last price of every contract in one request
    async fn fetch_tickers(&self) -> Result<Vec<TickerSnapshot>>;

    /// Most recent `lookback` klines of `symbol`, in whatever shape the exchange sends
    async fn fetch_candles(&self, symbol: &Symbol, lookback: usize) -> Result<Vec<RawKline>>;

    /// Current funding rate, `None` if the exchange does not report one
    async fn fetch_funding_rate(&self, symbol: &Symbol) -> Result<Option<f64>>;
}
