//! API server: HTTP (REST + Swagger UI) and the Prometheus exporter.

use crate::rest::{self, ProbeState};
use crate::swagger::ApiDoc;
use axum::routing::get;
use axum::Router;
use roster_core::config::AppConfig;
use roster_management::{management_router, ManagementState};
use std::net::SocketAddr;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Main API server.
pub struct ApiServer {
    config: AppConfig,
    management: ManagementState,
}

impl ApiServer {
    pub fn new(config: AppConfig, management: ManagementState) -> Self {
        Self { config, management }
    }

    /// Full application router: probes, management API and Swagger UI.
    pub fn router(&self) -> Router {
        let probes = ProbeState {
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
            management: self.management.clone(),
        };

        Router::new()
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            .with_state(probes)
            .merge(management_router(self.management.clone()))
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use roster_channels::{CaptureSender, DocumentLibrary};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn server() -> ApiServer {
        let config = AppConfig::default();
        let management = ManagementState::new(
            &config,
            Arc::new(CaptureSender::new()),
            Arc::new(DocumentLibrary::new()),
        );
        ApiServer::new(config, management)
    }

    async fn get(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_probes_are_public() {
        let app = server().router();
        assert_eq!(get(app.clone(), "/health").await, StatusCode::OK);
        assert_eq!(get(app.clone(), "/ready").await, StatusCode::OK);
        assert_eq!(get(app, "/live").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_management_routes_are_mounted_behind_auth() {
        let app = server().router();
        assert_eq!(get(app.clone(), "/api/campaigns").await, StatusCode::UNAUTHORIZED);
        assert_eq!(get(app, "/api-docs/openapi.json").await, StatusCode::OK);
    }
}
