//! Headless server binary for the order approval and submission control
//! plane. No UI, no dashboard — structured logs to stdout and a minimal
//! HTTP surface for operational checks.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

use trade_control_plane::application::alert_rate_limiter::{AlertRateLimiter, AlertRateLimiterConfig};
use trade_control_plane::application::approval_service::ApprovalService;
use trade_control_plane::application::feature_flags::FeatureFlags;
use trade_control_plane::application::instrument_resolver::InstrumentResolver;
use trade_control_plane::application::kill_switch::KillSwitch;
use trade_control_plane::application::market_data_cache::MarketDataCache;
use trade_control_plane::application::order_submitter::OrderSubmitter;
use trade_control_plane::application::proposal_store::ProposalStore;
use trade_control_plane::application::reconciliation::Reconciler;
use trade_control_plane::application::safety_gate::SafetyGate;
use trade_control_plane::config::{BrokerMode, Config};
use trade_control_plane::domain::ports::BrokerPort;
use trade_control_plane::infrastructure::audit_store::JsonLinesAuditSink;
use trade_control_plane::infrastructure::backup::BackupService;
use trade_control_plane::infrastructure::connection_manager::ConnectionManager;
use trade_control_plane::infrastructure::fake_broker::FakeBroker;
use trade_control_plane::infrastructure::http_broker::HttpBroker;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("control plane server {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(broker_mode = ?config.broker_mode, "configuration loaded");

    let broker: Arc<dyn BrokerPort> = match config.broker_mode {
        BrokerMode::Fake => Arc::new(FakeBroker::new(config.fake_broker_starting_cash)),
        BrokerMode::Http => Arc::new(HttpBroker::new(
            config.http_broker_base_url.clone(),
            config.http_broker_api_key.clone(),
        )),
    };

    let connection_manager = ConnectionManager::new(broker.clone(), config.broker_connection.clone());
    connection_manager.ensure_connected().await?;
    info!("broker connection established");

    let audit = Arc::new(JsonLinesAuditSink::new(config.audit_log_path.clone())?);

    let store = Arc::new(ProposalStore::new(
        config.proposal_store_max_entries,
        chrono::Duration::minutes(config.approval_token_ttl_minutes),
    ));
    let alert_rate_limiter = Arc::new(AlertRateLimiter::new(AlertRateLimiterConfig::default()));
    let kill_switch = Arc::new(KillSwitch::new(chrono::Utc::now(), alert_rate_limiter.clone()));
    let flags = Arc::new(FeatureFlags::load(config.feature_flags_path.clone()));

    let approval_service = Arc::new(ApprovalService::new(store.clone()));
    let order_submitter = Arc::new(OrderSubmitter::new(
        store.clone(),
        approval_service.clone(),
        broker.clone(),
        audit.clone(),
        config.broker_connection.readonly_mode,
        config.live_guardrails.clone(),
    ));
    let reconciler = Reconciler::new(broker.clone());
    let safety_gate = SafetyGate::new(store.clone(), kill_switch.clone(), broker.clone());
    let instrument_resolver = InstrumentResolver::new(broker.clone());
    let market_data_cache = MarketDataCache::new(
        broker.clone(),
        config.market_data_snapshot_ttl,
        config.market_data_bars_ttl,
        config.market_data_cache_max_entries,
    );
    let backup_service = BackupService::new(
        config.audit_log_path.clone(),
        config.backup_dir.clone(),
        chrono::Duration::days(config.backup_retention_days),
    );

    // Silence unused-variable warnings for components not yet wired to an
    // inbound transport; they are exercised directly by the test suite.
    let _ = (&order_submitter, &reconciler, &instrument_resolver, &market_data_cache);

    let report = safety_gate.run(&flags.snapshot()).await;
    info!(ready_for_live = report.ready_for_live(), "safety gate evaluated at startup");

    info!("running initial audit backup");
    if let Err(e) = backup_service.run_backup(chrono::Utc::now()).await {
        tracing::warn!(error = %e, "initial audit backup failed");
    }

    info!("control plane ready");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    Ok(())
}
