//! HTTP server
//!
//! Builds the router: route classes get their own admission budgets, the
//! whole surface gets concurrency, body-size and timeout limits plus HTTP
//! tracing and CORS.

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::{limit::ConcurrencyLimitLayer, timeout::TimeoutLayer, BoxError, ServiceBuilder};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;

use crate::alerts::AlertManager;
use crate::api::admission::{admission_middleware, AdmissionControl, AdmissionLayer, RouteClass};
use crate::api::handlers;
use crate::core::config::SentinelConfig;
use crate::core::errors::Result;
use crate::gateway::IngestionGateway;
use crate::hub::{spawn_analytics_publisher, BroadcastHub};
use crate::notify::Fanout;
use crate::scoring::{HttpScoringClient, ScoringOracle};
use crate::storage::{MemoryStorage, StorageBackend};

const MAX_CONCURRENCY: usize = 100;
const MAX_BODY_SIZE: usize = 1024 * 1024;
// must cover a batch scoring call through its full retry schedule:
// 4 attempts of 60s each plus 2+4+8s of backoff
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared handler state. Every component is injected; nothing here is a
/// process-wide singleton.
#[derive(Clone)]
pub struct ApiState {
    pub gateway: Arc<IngestionGateway>,
    pub alerts: Arc<AlertManager>,
    pub storage: Arc<dyn StorageBackend>,
    pub oracle: Arc<dyn ScoringOracle>,
    pub hub: Arc<BroadcastHub>,
}

pub struct SentinelServer {
    pub host: String,
    pub port: u16,
    pub config: SentinelConfig,
    state: ApiState,
    admission: Arc<AdmissionControl>,
}

impl SentinelServer {
    /// Build the full component graph from configuration.
    pub fn new(host: String, port: u16, config: SentinelConfig) -> Result<Self> {
        config.validate()?;
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::default());
        let oracle: Arc<dyn ScoringOracle> =
            Arc::new(HttpScoringClient::new(config.scoring.clone()));
        Ok(Self::with_components(host, port, config, storage, oracle))
    }

    /// Wire the server from externally built components. Tests use this to
    /// swap the storage backend or point the oracle at a mock.
    pub fn with_components(
        host: String,
        port: u16,
        config: SentinelConfig,
        storage: Arc<dyn StorageBackend>,
        oracle: Arc<dyn ScoringOracle>,
    ) -> Self {
        let alerts = Arc::new(AlertManager::new(storage.clone(), config.alerts.clone()));
        let fanout = Arc::new(Fanout::from_config(&config.notify));
        let hub = Arc::new(BroadcastHub::new(config.hub.buffer_size));
        let gateway = Arc::new(IngestionGateway::new(
            storage.clone(),
            oracle.clone(),
            alerts.clone(),
            fanout,
            hub.clone(),
            &config.scoring,
        ));
        let admission = Arc::new(AdmissionControl::new(&config.admission));
        let state = ApiState { gateway, alerts, storage, oracle, hub };
        Self { host, port, config, state, admission }
    }

    pub fn state(&self) -> &ApiState {
        &self.state
    }

    pub fn admission(&self) -> &Arc<AdmissionControl> {
        &self.admission
    }

    fn class_layer(&self, class: RouteClass) -> AdmissionLayer {
        AdmissionLayer { control: self.admission.clone(), class }
    }

    pub fn create_router(&self) -> Router {
        // scoring class: everything that fans into the oracle
        let scoring_routes = Router::new()
            .route("/api/transactions/analyze", post(handlers::analyze_transaction))
            .route("/api/transactions/analyze-batch", post(handlers::analyze_batch))
            .route_layer(middleware::from_fn_with_state(
                self.class_layer(RouteClass::Scoring),
                admission_middleware,
            ));

        // general class: reads
        let general_routes = Router::new()
            .route("/api/alerts", get(handlers::list_alerts))
            .route("/api/alerts/:id", get(handlers::get_alert))
            .route("/api/stats", get(handlers::get_stats))
            .route_layer(middleware::from_fn_with_state(
                self.class_layer(RouteClass::General),
                admission_middleware,
            ));

        // admin class: operator actions
        let admin_routes = Router::new()
            .route("/api/alerts/:id/acknowledge", post(handlers::acknowledge_alert))
            .route("/api/alerts/:id/resolve", post(handlers::resolve_alert))
            .route("/api/alerts/:id/false-positive", post(handlers::false_positive_alert))
            .route("/api/model/retrain", post(handlers::trigger_retrain))
            .route_layer(middleware::from_fn_with_state(
                self.class_layer(RouteClass::Admin),
                admission_middleware,
            ));

        // health and the event stream sit outside the admission budgets
        let open_routes = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/api/ws", get(handlers::websocket_handler));

        Router::new()
            .merge(scoring_routes)
            .merge(general_routes)
            .merge(admin_routes)
            .merge(open_routes)
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(|err: BoxError| async move {
                        if err.is::<tower::timeout::error::Elapsed>() {
                            (StatusCode::REQUEST_TIMEOUT, "request timed out")
                        } else {
                            (StatusCode::SERVICE_UNAVAILABLE, "service overloaded")
                        }
                    }))
                    .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENCY))
                    .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
                    .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                    .layer(TraceLayer::new_for_http()),
            )
            .layer(CorsLayer::permissive())
    }

    pub async fn start(self) -> anyhow::Result<()> {
        spawn_analytics_publisher(
            self.state.hub.clone(),
            self.state.storage.clone(),
            Duration::from_secs(self.config.hub.analytics_interval_secs),
        );

        let app = self.create_router();
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(addr, "sentinel listening");
        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}
