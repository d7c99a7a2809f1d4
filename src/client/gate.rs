//! Gate.io futures REST client
//!
//! Public endpoints only, no authentication.

use super::MarketDataSource;
use crate::candles::RawKline;
use crate::config::ExchangeConfig;
use crate::error::{BotError, Result};
use crate::types::{Symbol, TickerSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Gate.io caps a candlestick request at this many rows
const MAX_CANDLE_LIMIT: usize = 2000;

#[derive(Clone)]
pub struct GateClient {
    http: Client,
    base_url: String,
    settle: String,
    interval: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GateContract {
    name: String,
    #[serde(default)]
    in_delisting: bool,
    #[serde(default)]
    funding_rate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GateTicker {
    contract: String,
    last: String,
}

/// Error body, e.g. `{"label":"CONTRACT_NOT_FOUND","message":"..."}`
#[derive(Debug, Default, Deserialize)]
struct GateErrorBody {
    #[serde(default)]
    label: String,
    #[serde(default)]
    message: String,
}

impl GateClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            settle: config.settle.to_lowercase(),
            interval: config.candle_interval.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/futures/{}{}", self.base_url, self.settle, path);
        let resp = self.http.get(&url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!("GET {} -> {}: {}", url, status, body);
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl MarketDataSource for GateClient {
    async fn fetch_symbol_universe(&self) -> Result<BTreeSet<Symbol>> {
        let contracts: Vec<GateContract> = self.get("/contracts", &[]).await?;
        let total = contracts.len();
        let universe = tradable(contracts);
        debug!("{} of {} contracts tradable", universe.len(), total);
        Ok(universe)
    }

    async fn fetch_tickers(&self) -> Result<Vec<TickerSnapshot>> {
        let tickers: Vec<GateTicker> = self.get("/tickers", &[]).await?;
        Ok(into_snapshots(tickers, Utc::now()))
    }

    async fn fetch_candles(&self, symbol: &Symbol, lookback: usize) -> Result<Vec<RawKline>> {
        let limit = lookback.clamp(1, MAX_CANDLE_LIMIT);
        self.get(
            "/candlesticks",
            &[
                ("contract", symbol.to_string()),
                ("interval", self.interval.clone()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn fetch_funding_rate(&self, symbol: &Symbol) -> Result<Option<f64>> {
        let contract: GateContract = self
            .get(&format!("/contracts/{}", symbol), &[])
            .await?;
        Ok(contract.funding_rate.as_deref().and_then(parse_rate))
    }
}

/// Map a non-2xx response onto the error taxonomy
fn api_error(status: u16, body: &str) -> BotError {
    let parsed: GateErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.message.is_empty() {
        body.trim().to_string()
    } else {
        parsed.message
    };
    let label = parsed.label;

    if status == 429 || label == "TOO_MANY_REQUESTS" {
        return BotError::RateLimited(message);
    }
    if status == 400 || label == "CONTRACT_NOT_FOUND" || label.starts_with("INVALID_") {
        let detail = if label.is_empty() {
            message
        } else {
            format!("{}: {}", label, message)
        };
        return BotError::InvalidRequest(detail);
    }

    BotError::Api { status, message }
}

fn tradable(contracts: Vec<GateContract>) -> BTreeSet<Symbol> {
    contracts
        .into_iter()
        .filter(|c| !c.in_delisting)
        .map(|c| Symbol::new(c.name))
        .collect()
}

fn into_snapshots(tickers: Vec<GateTicker>, observed_at: DateTime<Utc>) -> Vec<TickerSnapshot> {
    tickers
        .into_iter()
        .filter_map(|t| {
            let last_price = parse_rate(&t.last)?;
            Some(TickerSnapshot {
                symbol: Symbol::new(t.contract),
                last_price,
                observed_at,
            })
        })
        .collect()
}

/// Decimal string to a finite f64
fn parse_rate(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_api_error_classes() {
        let e = api_error(429, r#"{"label":"TOO_MANY_REQUESTS","message":"slow down"}"#);
        assert_eq!(e.class(), ErrorClass::Throttled);

        let e = api_error(
            404,
            r#"{"label":"CONTRACT_NOT_FOUND","message":"contract not found"}"#,
        );
        assert_eq!(e.class(), ErrorClass::Rejected);
        assert!(e.to_string().contains("CONTRACT_NOT_FOUND"));

        let e = api_error(400, r#"{"label":"INVALID_PARAM_VALUE","message":"interval"}"#);
        assert_eq!(e.class(), ErrorClass::Rejected);

        let e = api_error(502, "<html>bad gateway</html>");
        assert_eq!(e.class(), ErrorClass::Transient);
        match e {
            BotError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "<html>bad gateway</html>");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_label_wins_over_status() {
        // some gateways answer throttling with 403
        let e = api_error(403, r#"{"label":"TOO_MANY_REQUESTS","message":""}"#);
        assert_eq!(e.class(), ErrorClass::Throttled);
    }

    #[test]
    fn test_contracts_filter_delisting() {
        let body = r#"[
            {"name":"BTC_USDT","in_delisting":false,"funding_rate":"0.0001","quanto_multiplier":"0.0001"},
            {"name":"OLD_USDT","in_delisting":true},
            {"name":"ETH_USDT"}
        ]"#;
        let contracts: Vec<GateContract> = serde_json::from_str(body).unwrap();
        let universe = tradable(contracts);

        assert_eq!(universe.len(), 2);
        assert!(universe.contains(&Symbol::from("BTC_USDT")));
        assert!(!universe.contains(&Symbol::from("OLD_USDT")));
    }

    #[test]
    fn test_tickers_skip_bad_prices() {
        let body = r#"[
            {"contract":"BTC_USDT","last":"65000.1","volume_24h":"123"},
            {"contract":"BAD_USDT","last":""},
            {"contract":"ETH_USDT","last":"3100"}
        ]"#;
        let tickers: Vec<GateTicker> = serde_json::from_str(body).unwrap();
        let now = Utc::now();
        let snaps = into_snapshots(tickers, now);

        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].symbol, Symbol::from("BTC_USDT"));
        assert_eq!(snaps[0].last_price, 65000.1);
        assert_eq!(snaps[1].observed_at, now);
    }

    #[test]
    fn test_candlesticks_payload() {
        let body = r#"[
            {"t":1700000000,"v":120,"c":"101.5","h":"102","l":"99.8","o":"100","sum":"12150"},
            {"t":1700000060,"v":80,"c":"102.1","h":"102.4","l":"101.2","o":"101.5","sum":"8150"}
        ]"#;
        let raw: Vec<RawKline> = serde_json::from_str(body).unwrap();
        assert_eq!(raw.len(), 2);
        assert!(matches!(raw[0], RawKline::Object(_)));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("0.0001"), Some(0.0001));
        assert_eq!(parse_rate(" -0.00025 "), Some(-0.00025));
        assert_eq!(parse_rate("NaN"), None);
        assert_eq!(parse_rate(""), None);
    }

    #[test]
    fn test_new_trims_base_url() {
        let config = ExchangeConfig {
            base_url: "https://api.gateio.ws/api/v4/".to_string(),
            settle: "USDT".to_string(),
            ..ExchangeConfig::default()
        };
        let client = GateClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://api.gateio.ws/api/v4");
        assert_eq!(client.settle, "usdt");
    }
}
