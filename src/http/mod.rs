//! HTTP server for Flowsmith
//!
//! Provides the REST API for all Flowsmith operations. Routes come from the
//! operation metadata, so the API and the CLI stay in lockstep.

use crate::config::{Config, HttpConfig};
use crate::core::{Dependencies, OperationRegistry};
use crate::{FlowsmithError, Result};
use axum::{
    Router,
    extract::Json,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Error type for HTTP handlers
///
/// Every failure is rendered as `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub struct AppError(FlowsmithError);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            FlowsmithError::Validation(_) | FlowsmithError::MissingCredentials { .. } => {
                StatusCode::BAD_REQUEST
            }
            FlowsmithError::NotFound(_) => StatusCode::NOT_FOUND,
            FlowsmithError::Generation(_)
            | FlowsmithError::MalformedOutput(_)
            | FlowsmithError::Network(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self.0 {
            FlowsmithError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                "An internal storage error occurred".to_string()
            }
            other if status.is_server_error() => {
                tracing::error!(status = %status, "Request failed: {}", other);
                other.to_string()
            }
            other => other.to_string(),
        };

        tracing::debug!(status = %status, message = %message, "HTTP request error response");

        let mut body = json!({
            "success": false,
            "error": message,
        });
        if let FlowsmithError::MissingCredentials { missing } = &self.0 {
            body["missing_credentials"] = json!(missing);
        }

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<FlowsmithError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Start the HTTP server and block until it exits
///
/// Ctrl-C stops accepting requests and cancels every scheduled automation.
pub async fn start_server(config: Config) -> Result<()> {
    let http_config = config.http_config();

    let dependencies = crate::core::create_dependencies(&config).await?;
    let registry = OperationRegistry::new(dependencies);
    let deps = registry.get_dependencies();

    let app = build_router(deps.clone(), &http_config);

    let addr = format!("{}:{}", http_config.host, http_config.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| FlowsmithError::config(format!("Invalid address {}: {}", addr, e)))?;

    tracing::info!(
        operations = registry.get_all_metadata().len(),
        "Starting HTTP server on {}",
        socket_addr
    );

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .map_err(|e| FlowsmithError::config(format!("Server error: {}", e)))?;

    deps.scheduler.shutdown();
    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Routes generated by every operation group
fn build_operation_routes(deps: Arc<Dependencies>) -> Router {
    use crate::core::{
        automations::automations, credentials::credentials, execution::execution,
        pipeline::pipeline, projects::projects, saved_flows::saved_flows, system::system,
    };

    Router::new()
        .merge(pipeline::register_http_routes(deps.clone()))
        .merge(execution::register_http_routes(deps.clone()))
        .merge(automations::register_http_routes(deps.clone()))
        .merge(saved_flows::register_http_routes(deps.clone()))
        .merge(projects::register_http_routes(deps.clone()))
        .merge(credentials::register_http_routes(deps.clone()))
        .merge(system::register_http_routes(deps))
}

/// Build the router with all endpoints and the middleware stack
pub fn build_router(deps: Arc<Dependencies>, http_config: &HttpConfig) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(build_operation_routes(deps))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().include_headers(false))
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(cors_layer(http_config)),
        )
}

/// Origins allowed to call the API from a browser
///
/// Configured origins win; otherwise localhost on the bound port.
fn allowed_origins(http_config: &HttpConfig) -> Vec<HeaderValue> {
    let raw = match &http_config.allowed_origins {
        Some(origins) if !origins.is_empty() => origins.clone(),
        _ => vec![
            format!("http://localhost:{}", http_config.port),
            format!("http://127.0.0.1:{}", http_config.port),
        ],
    };

    raw.into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

fn cors_layer(http_config: &HttpConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origins(http_config))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn metrics_handler() -> std::result::Result<Response, AppError> {
    let metrics = crate::telemetry::get_metrics()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics,
    )
        .into_response())
}

#[cfg(test)]
mod http_test;
