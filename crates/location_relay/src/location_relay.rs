use crate::domain::{
    BroadcastLocationPublisher, Normalizer, PollingScheduler, RosterResolver, WebhookIngestor,
    WebhookService,
};
use crate::radar::{RadarConfig, RadarPositionProvider};
use crate::transport::{build_router, run_http_server, AppState, HttpServerConfig};
use axum::http::HeaderName;
use axum::Router;
use common::domain::{DomainError, OperatorRepository, PositionProvider};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const POLLER_PROCESS: &str = "location_poller";
pub const HTTP_PROCESS: &str = "http_transport";

/// Long-running relay process, driven by the runner's cancellation token
pub type RelayProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

#[derive(Debug, Clone)]
pub struct LocationRelayConfig {
    pub radar: RadarConfig,
    /// Shared HMAC secret for webhook signatures
    pub webhook_secret: String,
    pub http: HttpServerConfig,
    pub poll_interval: Duration,
    pub default_role: String,
    pub broadcast_capacity: usize,
}

impl Default for LocationRelayConfig {
    fn default() -> Self {
        Self {
            radar: RadarConfig::default(),
            webhook_secret: String::new(),
            http: HttpServerConfig::default(),
            poll_interval: Duration::from_secs(10),
            default_role: "operator".to_string(),
            broadcast_capacity: 256,
        }
    }
}

/// Wires roster, provider, normalizer and broadcaster into the poller and
/// the HTTP transport
pub struct LocationRelay {
    scheduler: Arc<PollingScheduler>,
    webhook_service: Arc<WebhookService>,
    publisher: BroadcastLocationPublisher,
    http_config: HttpServerConfig,
    signature_header: HeaderName,
}

impl LocationRelay {
    pub fn new(
        operator_repository: Arc<dyn OperatorRepository>,
        config: LocationRelayConfig,
    ) -> anyhow::Result<Self> {
        let provider = Arc::new(RadarPositionProvider::new(config.radar.clone())?);
        Self::with_position_provider(operator_repository, provider, config)
    }

    pub fn with_position_provider(
        operator_repository: Arc<dyn OperatorRepository>,
        position_provider: Arc<dyn PositionProvider>,
        config: LocationRelayConfig,
    ) -> anyhow::Result<Self> {
        info!("Initializing location relay");

        if config.webhook_secret.is_empty() {
            return Err(DomainError::InvalidConfiguration(
                "webhook secret must not be empty".to_string(),
            )
            .into());
        }
        if config.poll_interval.is_zero() {
            return Err(DomainError::InvalidConfiguration(
                "poll interval must be greater than zero".to_string(),
            )
            .into());
        }
        let signature_header = HeaderName::try_from(config.http.signature_header.as_str())
            .map_err(|e| {
                DomainError::InvalidConfiguration(format!(
                    "signature header '{}': {}",
                    config.http.signature_header, e
                ))
            })?;

        let publisher = BroadcastLocationPublisher::new(config.broadcast_capacity);
        let roster_resolver = Arc::new(RosterResolver::new(operator_repository));
        let normalizer = Normalizer::new(config.default_role);

        let scheduler = Arc::new(PollingScheduler::new(
            roster_resolver.clone(),
            position_provider,
            normalizer.clone(),
            Arc::new(publisher.clone()),
            config.poll_interval,
        ));

        let webhook_service = Arc::new(WebhookService::new(
            WebhookIngestor::new(config.webhook_secret),
            roster_resolver,
            normalizer,
            Arc::new(publisher.clone()),
        ));

        info!(
            poll_interval = ?config.poll_interval,
            broadcast_capacity = config.broadcast_capacity,
            "Location relay initialized"
        );

        Ok(Self {
            scheduler,
            webhook_service,
            publisher,
            http_config: config.http,
            signature_header,
        })
    }

    pub fn publisher(&self) -> &BroadcastLocationPublisher {
        &self.publisher
    }

    pub fn scheduler(&self) -> Arc<PollingScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Router with open streams bound to `shutdown`
    pub fn router(&self, shutdown: CancellationToken) -> Router {
        build_router(
            AppState {
                webhook_service: Arc::clone(&self.webhook_service),
                publisher: self.publisher.clone(),
                signature_header: self.signature_header.clone(),
                shutdown,
            },
            &self.http_config.cors,
        )
    }

    pub fn into_runner_processes(self) -> Vec<(&'static str, RelayProcess)> {
        let scheduler = Arc::clone(&self.scheduler);

        let poller: RelayProcess =
            Box::new(move |ctx| Box::pin(async move { scheduler.run(ctx).await }));

        let http_transport: RelayProcess = Box::new(move |ctx| {
            Box::pin(async move {
                let router = self.router(ctx.clone());
                run_http_server(&self.http_config, router, ctx).await
            })
        });

        vec![(POLLER_PROCESS, poller), (HTTP_PROCESS, http_transport)]
    }
}
