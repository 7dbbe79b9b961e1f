use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryAuditLog};
use crate::routes::with_ledger_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use behavior_ledger::config::AppConfig;
use behavior_ledger::error::AppError;
use behavior_ledger::ledger::{InMemoryLedgerStore, LedgerService};
use behavior_ledger::roster::RosterImporter;
use behavior_ledger::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryLedgerStore::default());
    let audit = Arc::new(InMemoryAuditLog::default());
    let ledger_service = Arc::new(LedgerService::new(store, audit, config.ledger));

    if let Some(roster) = args.roster.take() {
        let summary = RosterImporter::from_path(&roster, &*ledger_service)?;
        info!(
            path = %roster.display(),
            registered = summary.registered.len(),
            skipped = summary.skipped.len(),
            "roster preloaded"
        );
    }

    let app = with_ledger_routes(ledger_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        max_write_attempts = config.ledger.max_write_attempts,
        "behavior score ledger ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
