use crate::cli::ServeArgs;
use crate::infra::{spawn_audit_log, AppState, Wiring};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lifeline::config::AppConfig;
use lifeline::error::AppError;
use lifeline::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;
    if config.access.admin_ids.is_empty() {
        warn!("APP_ADMIN_IDS is empty; no account can review or administer records");
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let wiring = Wiring::from_config(&config);
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        directory: wiring.directory.clone(),
        payments: wiring.payments.clone(),
    };

    let _audit = spawn_audit_log(&wiring.events);

    let app = with_service_routes(wiring.registry)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        blood_match_mode = ?config.matching.blood_match_mode,
        redonation_interval_days = config.matching.redonation_interval_days,
        admins = config.access.admin_ids.len(),
        "registry service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
