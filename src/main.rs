//! Candle Alert Bot
//!
//! Scans futures contracts and sends Telegram alerts on candle patterns.

use candle_alert_bot::{
    client::GateClient,
    config::Config,
    monitor::PollOrchestrator,
    notify::{format_event, Notifier},
    types::Symbol,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "candle-alert-bot")]
#[command(about = "Alerts on candle streaks, price drift and pump-dump patterns")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the exchange and send alerts
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Analyze one contract now, ignoring cooldowns
    Scan {
        /// Contract name, e.g. BTC_USDT
        symbol: String,
    },
    /// Test Telegram notification
    TestNotify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run { once } => run_bot(config, once).await,
        Commands::Scan { symbol } => scan_symbol(config, &symbol).await,
        Commands::TestNotify => test_notify(config).await,
    }
}

fn build_notifier(config: &Config) -> Notifier {
    if let Some(tg) = &config.telegram {
        Notifier::new(tg.bot_token.clone(), tg.chat_id.clone())
    } else {
        tracing::warn!("Telegram not configured, alerts are only logged");
        Notifier::disabled()
    }
}

async fn run_bot(config: Config, once: bool) -> anyhow::Result<()> {
    tracing::info!("Starting candle alert bot");

    let notifier = build_notifier(&config);
    let client = Arc::new(GateClient::new(&config.exchange)?);
    let mut orchestrator = PollOrchestrator::new(&config, client, Arc::new(notifier.clone()));

    if once {
        let report = orchestrator.run_cycle(None).await;
        println!(
            "Scanned {} symbols: {} events, {} alerts sent, {} suppressed, {} failed",
            report.symbols_scanned,
            report.events_detected,
            report.alerts_sent,
            report.suppressed,
            report.failed
        );
        return Ok(());
    }

    let notify_startup = config.telegram.as_ref().is_some_and(|tg| tg.notify_startup);
    if orchestrator.refresh_universe().await && notify_startup {
        if let Err(e) = notifier.startup(orchestrator.universe().len()).await {
            tracing::warn!("Failed to send startup notification: {}", e);
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, finishing current cycle");
            let _ = stop_tx.send(true);
        }
    });

    orchestrator.run(stop_rx).await;
    tracing::info!("Stopped");
    Ok(())
}

async fn scan_symbol(config: Config, symbol: &str) -> anyhow::Result<()> {
    let client = Arc::new(GateClient::new(&config.exchange)?);
    let orchestrator = PollOrchestrator::new(&config, client, Arc::new(Notifier::disabled()));
    let symbol = Symbol::new(symbol.to_uppercase());

    match orchestrator.scan_one(&symbol).await {
        None => println!("No candle data for {}", symbol),
        Some(events) if events.is_empty() => println!("{}: no pattern", symbol),
        Some(events) => {
            for event in &events {
                println!("{}\n", format_event(event));
            }
        }
    }

    Ok(())
}

async fn test_notify(config: Config) -> anyhow::Result<()> {
    let tg_config = config
        .telegram
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Telegram not configured in config.toml"))?;

    let notifier = Notifier::new(tg_config.bot_token.clone(), tg_config.chat_id.clone());

    notifier
        .send("🧪 <b>Test Notification</b>\n\nIf you see this, Telegram integration is working!")
        .await?;

    println!("✅ Test notification sent!");
    Ok(())
}
