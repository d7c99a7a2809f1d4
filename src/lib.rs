//! Candle Alert Bot
//!
//! Polls a futures exchange for every listed contract and alerts on short-lived
//! price patterns: candle streaks, cumulative drift and pump-then-dump reversals.
//!
//! ## Architecture
//!
//! ```text
//! Client (universe, tickers) → Drift ─────────────────────┐
//!        │                                                ↓
//!        └→ Scheduler (rate-limited, retried candle fetches)
//!              → Candles → Analysis (streak, pump-dump) → Cooldown gate → Notifier
//! ```

pub mod analysis;
pub mod candles;
pub mod client;
pub mod config;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod scheduler;
pub mod strategy;
pub mod types;
