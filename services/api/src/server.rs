use crate::cli::ServeArgs;
use crate::infra::{build_coordinator, catalog_store, AppState};
use crate::routes::with_enrollment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use course_enrollment::config::AppConfig;
use course_enrollment::enrollment::CoordinatorError;
use course_enrollment::error::AppError;
use course_enrollment::telemetry;
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

    let store = Arc::new(catalog_store().map_err(CoordinatorError::from)?);
    let coordinator = Arc::new(build_coordinator(store, config.enrollment.policy(), None));

    let app = with_enrollment_routes(coordinator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        allow_retake = config.enrollment.allow_retake,
        "course enrollment coordinator ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
