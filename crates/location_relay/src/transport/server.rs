//! HTTP transport for the relay.
//!
//! Routes:
//! - `GET /` liveness page
//! - `POST /api/live-location` signed provider webhook
//! - `GET /ws` live location stream

use crate::domain::{BroadcastLocationPublisher, WebhookService};
use crate::transport::{live_location, location_stream};
use axum::http::{HeaderName, Method};
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info};

/// CORS configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins. `["*"]` allows every origin.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl CorsConfig {
    /// Parse a comma-separated origin list; blank input allows every origin.
    pub fn from_comma_separated(origins: &str) -> Self {
        let allowed_origins: Vec<String> = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if allowed_origins.is_empty() {
            Self::default()
        } else {
            Self { allowed_origins }
        }
    }

    fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
    /// Header carrying the webhook signature
    pub signature_header: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors: CorsConfig::default(),
            signature_header: "x-radar-signature".to_string(),
        }
    }
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub webhook_service: Arc<WebhookService>,
    pub publisher: BroadcastLocationPublisher,
    pub signature_header: HeaderName,
    /// Cancelled on shutdown so open streams close
    pub shutdown: CancellationToken,
}

fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let allow_origin = if config.allows_any() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ])
}

pub fn build_router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/api/live-location", post(live_location))
        .route("/ws", get(location_stream))
        .layer(build_cors_layer(cors))
        .with_state(state)
}

async fn liveness() -> Html<&'static str> {
    Html(
        "<html style=\"font-family: sans-serif; text-align: center; padding-top: 50px;\">\
         <h1>Location relay is running</h1></html>",
    )
}

/// Serve `router` until `ctx` is cancelled
pub async fn run_http_server(
    config: &HttpServerConfig,
    router: Router,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "HTTP transport listening");

    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        ctx.cancelled().await;
        debug!("HTTP transport shutdown signal received");
    });

    match serve.await {
        Ok(()) => {
            debug!("HTTP transport stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("HTTP transport error: {}", e);
            Err(e.into())
        }
    }
}
