//! Configuration
//!
//! Loaded from a TOML file layered with `ALERT_BOT__SECTION__KEY`
//! environment variables (a `.env` file is read first if present).

use crate::error::{BotError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub scheduler: SchedulerConfig,
    pub streak: StreakConfig,
    pub drift: DriftConfig,
    pub pump_dump: PumpDumpConfig,
    pub alerts: AlertConfig,
    pub telegram: Option<TelegramConfig>,
}

/// Market data endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    /// Settlement currency of the futures market (`usdt`, `btc`)
    pub settle: String,
    /// Candle granularity as the exchange names it (`1m`, `5m`, `1h`)
    pub candle_interval: String,
    /// Candles requested per symbol per cycle
    pub candle_lookback: usize,
    pub request_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gateio.ws/api/v4".to_string(),
            settle: "usdt".to_string(),
            candle_interval: "1m".to_string(),
            candle_lookback: 60,
            request_timeout_secs: 10,
        }
    }
}

impl ExchangeConfig {
    /// Bar length of `candle_interval`
    pub fn bar_duration(&self) -> Option<Duration> {
        parse_interval(&self.candle_interval)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    /// How often the contract list is refetched
    pub universe_refresh_secs: u64,
    /// Per-symbol fetches in flight at once
    pub max_concurrency: usize,
    /// Per-symbol fetch starts per second
    pub max_starts_per_sec: u32,
    pub fetch_attempts: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            universe_refresh_secs: 300,
            max_concurrency: 8,
            max_starts_per_sec: 10,
            fetch_attempts: 3,
            backoff_min_ms: 300,
            backoff_max_ms: 700,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn universe_refresh(&self) -> Duration {
        Duration::from_secs(self.universe_refresh_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreakConfig {
    /// Minimum |percent change| for a candle to count, exclusive
    pub threshold_pct: f64,
    pub min_length: usize,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            threshold_pct: 2.0,
            min_length: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Percent move from baseline that fires, exclusive
    pub threshold_pct: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self { threshold_pct: 3.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PumpDumpConfig {
    /// Candles inspected for the peak
    pub window: usize,
    /// Required peak-to-now move in percent (negative)
    pub retracement_pct: f64,
    pub volume_spike_multiple: f64,
    /// Trailing candles left out of the volume baseline
    pub volume_exclude_last: usize,
    pub short_ma: usize,
    pub long_ma: usize,
    /// Highest funding rate still compatible with a dump
    pub funding_rate_ceiling: f64,
}

impl Default for PumpDumpConfig {
    fn default() -> Self {
        Self {
            window: 30,
            retracement_pct: -5.0,
            volume_spike_multiple: 3.0,
            volume_exclude_last: 3,
            short_ma: 5,
            long_ma: 30,
            funding_rate_ceiling: 0.0005,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum gap between two alerts for the same symbol
    pub cooldown_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { cooldown_ms: 5_000 }
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_true")]
    pub notify_startup: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load from `path` (missing file is fine) and the environment, then validate
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let expanded = shellexpand::tilde(path).into_owned();
        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from(Path::new(&expanded)).required(false))
            .add_source(
                ::config::Environment::with_prefix("ALERT_BOT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.max_concurrency == 0 {
            return Err(BotError::Config("scheduler.max_concurrency must be > 0".into()));
        }
        if s.max_starts_per_sec == 0 {
            return Err(BotError::Config("scheduler.max_starts_per_sec must be > 0".into()));
        }
        if s.fetch_attempts == 0 {
            return Err(BotError::Config("scheduler.fetch_attempts must be > 0".into()));
        }
        if s.backoff_min_ms >= s.backoff_max_ms {
            return Err(BotError::Config(format!(
                "scheduler backoff range [{}, {}) is empty",
                s.backoff_min_ms, s.backoff_max_ms
            )));
        }
        if s.poll_interval_ms == 0 {
            return Err(BotError::Config("scheduler.poll_interval_ms must be > 0".into()));
        }

        if self.exchange.bar_duration().is_none() {
            return Err(BotError::Config(format!(
                "unknown candle interval '{}'",
                self.exchange.candle_interval
            )));
        }

        if self.streak.threshold_pct <= 0.0 || self.streak.min_length < 1 {
            return Err(BotError::Config("streak threshold and length must be positive".into()));
        }
        if self.drift.threshold_pct <= 0.0 {
            return Err(BotError::Config("drift.threshold_pct must be > 0".into()));
        }

        let p = &self.pump_dump;
        if p.retracement_pct >= 0.0 {
            return Err(BotError::Config("pump_dump.retracement_pct must be negative".into()));
        }
        if p.short_ma == 0 || p.short_ma >= p.long_ma {
            return Err(BotError::Config(format!(
                "pump_dump moving averages need 0 < short ({}) < long ({})",
                p.short_ma, p.long_ma
            )));
        }
        if p.window < 3 || p.volume_exclude_last >= p.window {
            return Err(BotError::Config(
                "pump_dump.window must be >= 3 and larger than volume_exclude_last".into(),
            ));
        }
        if self.exchange.candle_lookback < p.window.max(p.long_ma + 1) {
            return Err(BotError::Config(format!(
                "exchange.candle_lookback ({}) too short for pump_dump (needs {})",
                self.exchange.candle_lookback,
                p.window.max(p.long_ma + 1)
            )));
        }

        Ok(())
    }
}

/// Parse `10s`, `1m`, `4h`, `1d`, `7d` style intervals
pub fn parse_interval(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (split, unit) = s.char_indices().last()?;
    let n: u64 = s[..split].parse().ok().filter(|n| *n > 0)?;
    let unit_secs: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        _ => return None,
    };
    let secs = n.checked_mul(unit_secs)?;
    Some(Duration::from_secs(secs))
}
