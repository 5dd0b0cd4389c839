use crate::domain::{IngestOutcome, Normalizer, RosterResolver, WebhookIngestor};
use common::domain::{CanonicalLocationEvent, DomainError, DomainResult, LocationBroadcaster};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Outcome of a webhook call that was accepted
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Published(CanonicalLocationEvent),
    Ignored(String),
}

/// Domain service for pushed location events
///
/// Flow:
/// 1. Verify the signature and extract the raw position
/// 2. Resolve the active roster
/// 3. Normalize against the roster
/// 4. Publish to subscribers
pub struct WebhookService {
    ingestor: WebhookIngestor,
    roster_resolver: Arc<RosterResolver>,
    normalizer: Normalizer,
    broadcaster: Arc<dyn LocationBroadcaster>,
}

impl WebhookService {
    pub fn new(
        ingestor: WebhookIngestor,
        roster_resolver: Arc<RosterResolver>,
        normalizer: Normalizer,
        broadcaster: Arc<dyn LocationBroadcaster>,
    ) -> Self {
        Self {
            ingestor,
            roster_resolver,
            normalizer,
            broadcaster,
        }
    }

    /// A missing signature is treated the same as a wrong one
    #[instrument(skip_all, fields(body_len = body.len()))]
    pub async fn handle(&self, body: &[u8], signature: Option<&str>) -> DomainResult<WebhookOutcome> {
        let signature = signature.ok_or(DomainError::SignatureInvalid)?;

        let raw = match self.ingestor.ingest(body, signature)? {
            IngestOutcome::Position(raw) => raw,
            IngestOutcome::Ignored(event_type) => {
                return Ok(WebhookOutcome::Ignored(event_type));
            }
        };

        debug!(external_id = %raw.external_id, "verified webhook location update");

        let roster = self.roster_resolver.active_operators().await;
        let event = self.normalizer.normalize(&raw, &roster)?;

        self.broadcaster.publish(&event);
        info!(
            operator_id = event.operator_id,
            external_id = %raw.external_id,
            "location updated and broadcast from webhook"
        );

        Ok(WebhookOutcome::Published(event))
    }
}
