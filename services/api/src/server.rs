use crate::cli::ServeArgs;
use crate::infra::{
    seed_sample_roster, AppState, InMemoryBrokerDirectory, InMemoryInquiryRepository,
    TracingActivityLog,
};
use crate::routes::with_inquiry_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use inquiry_desk::config::AppConfig;
use inquiry_desk::error::AppError;
use inquiry_desk::telemetry;
use inquiry_desk::workflows::inquiries::InquiryDeskService;
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

    let repository = InMemoryInquiryRepository::default();
    let directory = InMemoryBrokerDirectory::new(repository.clone());
    seed_sample_roster(&directory, Utc::now());
    let desk = Arc::new(InquiryDeskService::new(
        Arc::new(repository),
        Arc::new(directory),
        Arc::new(TracingActivityLog::default()),
        config.desk.clone(),
    ));

    let app = with_inquiry_routes(desk)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "inquiry desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
