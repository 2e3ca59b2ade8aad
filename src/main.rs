use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod bot;
mod config;
mod daily;
mod dashboard;
mod db;
mod error;
mod live_scores;
mod notify;
mod retry;

use bot::runner::ORPHAN_AFTER_CYCLES;
use bot::{BetEvaluator, CycleRunner, ReconcilerSettings, RunnerSettings, StaleBetReconciler};
use config::{Command, Config};
use dashboard::AppState;
use db::{Database, TrackingStore};
use live_scores::{MatchDataSource, SofaScore};
use notify::{LogNotifier, Notifier, TelegramNotifier};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let notifier: Arc<dyn Notifier> = {
        let telegram = TelegramNotifier::new(
            config.telegram_bot_token.clone(),
            config.telegram_chat_id.clone(),
        )?;
        if telegram.is_configured() {
            info!("Notifications go to Telegram chat");
            Arc::new(telegram)
        } else {
            warn!("Telegram not configured; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let sofascore = match SofaScore::new(&config.sofascore_api_url, &config.sport) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Match data source unavailable: {:#}", e);
            notifier
                .send(&format!("🔥 *FATAL ERROR*\nMatch data source failed to start: {}", e))
                .await;
            return Err(e);
        }
    };

    if let Some(Command::DailyFixtures { category_id, date, edge_size }) = config.command {
        let report =
            daily::run(sofascore.as_ref(), notifier.as_ref(), category_id, date, edge_size).await;
        if let Err(e) = &report {
            error!("Daily fixtures report failed: {:#}", e);
            notifier
                .send(&format!("🚨 *FATAL ERROR*: Failed to run fixture process: {:#}", e))
                .await;
        }
        return report;
    }

    let source: Arc<dyn MatchDataSource> = sofascore;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);
    let store = TrackingStore::load(db.clone());

    if let Some(addr) = &config.dashboard_addr {
        let addr: SocketAddr = addr.parse()?;
        let app = dashboard::router(AppState { db: db.clone() });
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Dashboard listening on http://{}", addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Dashboard server stopped: {}", e);
            }
        });
    }

    let keywords = config.keyword_list();
    let startup = format!(
        "🚀 *Halftime tracker started*\n\
         ⚽ Source: {} ({})\n\
         ⏱ Poll every {}s, stale after {} min\n\
         📊 Min combined goal average: {:.2}\n\
         🗂 Tracking {} fixture(s), {} open bet(s) ({} stale)",
        source.name(),
        config.sport,
        config.poll_interval_secs,
        config.stale_wait_minutes,
        config.min_total_average_goals,
        store.active_count(),
        store.unresolved_count(),
        store.list_stale_unresolved(config.stale_wait_minutes).len(),
    );
    if !notifier.send(&startup).await {
        warn!("Startup notification not delivered");
    }

    let reconciler = StaleBetReconciler::new(
        source.clone(),
        notifier.clone(),
        ReconcilerSettings {
            stale_wait_minutes: config.stale_wait_minutes,
            call_interval_secs: config.reconcile_call_interval_secs,
            retry: config.fetch_retry(),
        },
    );
    let runner = CycleRunner::new(
        store,
        source,
        notifier.clone(),
        BetEvaluator::new(notifier.clone()),
        reconciler,
        RunnerSettings {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            min_average_goals: config.min_total_average_goals,
            skip_keywords: keywords,
            orphan_after_cycles: ORPHAN_AFTER_CYCLES,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received; finishing current fixture and shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    runner.run(shutdown_rx).await
}
