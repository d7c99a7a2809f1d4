//! Alert delivery
//!
//! [`Notifier`] posts HTML messages to a Telegram chat. Without a bot token
//! it only logs, so the monitor runs the same with or without Telegram.

use crate::error::{BotError, Result};
use crate::types::{DetectionEvent, DriftEvent, PumpDumpEvent, StreakEvent};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

/// Where detection alerts go
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, event: &DetectionEvent) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest {
    chat_id: String,
    text: String,
    parse_mode: String,
    disable_web_page_preview: bool,
}

#[derive(Clone)]
pub struct Notifier {
    http: Client,
    /// `None` when disabled
    target: Option<(String, String)>,
    api_base: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: Client::new(),
            target: Some((bot_token, chat_id)),
            api_base: "https://api.telegram.org".to_string(),
        }
    }

    /// Log-only notifier
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            target: None,
            api_base: String::new(),
        }
    }

    /// Send raw HTML text
    pub async fn send(&self, text: &str) -> Result<()> {
        let Some((token, chat_id)) = &self.target else {
            info!("[notify] {}", text);
            return Ok(());
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let request = SendMessageRequest {
            chat_id: chat_id.clone(),
            text: text.to_string(),
            parse_mode: "HTML".to_string(),
            disable_web_page_preview: true,
        };

        let resp = self.http.post(&url).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Notify(format!("telegram {}: {}", status, body)));
        }
        debug!("Telegram message delivered");
        Ok(())
    }

    pub async fn startup(&self, symbols: usize) -> Result<()> {
        self.send(&format!(
            "🟢 <b>Candle alert bot started</b>\n\nWatching {} contracts",
            symbols
        ))
        .await
    }
}

#[async_trait]
impl AlertSink for Notifier {
    async fn notify(&self, event: &DetectionEvent) -> Result<()> {
        self.send(&format_event(event)).await
    }
}

/// Render an event as a Telegram HTML message
pub fn format_event(event: &DetectionEvent) -> String {
    match event {
        DetectionEvent::Streak(e) => format_streak(e),
        DetectionEvent::Drift(e) => format_drift(e),
        DetectionEvent::PumpDump(e) => format_pump_dump(e),
    }
}

fn format_streak(e: &StreakEvent) -> String {
    let moves = e
        .magnitudes
        .iter()
        .map(|m| format!("{:+.2}%", m))
        .collect::<Vec<_>>()
        .join(" → ");
    format!(
        "{} <b>{}</b> streak\n\n{} candles in a row\n{}",
        e.direction.arrow(),
        escape_html(e.symbol.as_str()),
        e.count,
        moves
    )
}

fn format_drift(e: &DriftEvent) -> String {
    format!(
        "{} <b>{}</b> drift {:.2}%\n\n{} → {}",
        e.direction.arrow(),
        escape_html(e.symbol.as_str()),
        e.change_percent,
        e.from_price,
        e.to_price
    )
}

fn format_pump_dump(e: &PumpDumpEvent) -> String {
    let funding = match e.funding_rate {
        Some(rate) => format!("{:.4}%", rate * 100.0),
        None => "n/a".to_string(),
    };
    format!(
        "🚨 <b>{}</b> pump &amp; dump\n\nPeak {} → now {} ({:.2}%)\nVolume x{:.1}\nFunding {}",
        escape_html(e.symbol.as_str()),
        e.peak_price,
        e.now_price,
        e.peak_to_now_percent,
        e.volume_spike_ratio,
        funding
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
