use common::domain::{normalize_external_id, DomainError, DomainResult, RawPosition};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Event type carried by location pushes
pub const LOCATION_UPDATED_EVENT: &str = "user.location.updated";

/// Result of ingesting a webhook that passed signature verification
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Position(RawPosition),
    /// Verified event of a type the relay does not act on
    Ignored(String),
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    event: Option<WebhookEvent>,
    #[serde(default)]
    user: Option<WebhookUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    #[serde(default, rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    location: Option<WebhookLocation>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    location_accuracy: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookLocation {
    #[serde(default)]
    coordinates: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookUser {
    #[serde(default)]
    external_id: Option<String>,
}

/// Trust boundary for pushed location events
///
/// The HMAC-SHA256 signature is computed over the compact JSON re-encoding of
/// the body with object keys sorted at every depth. Nothing is extracted from a
/// payload whose signature does not verify.
pub struct WebhookIngestor {
    secret: Vec<u8>,
}

impl WebhookIngestor {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn ingest(&self, raw_payload: &[u8], provided_signature: &str) -> DomainResult<IngestOutcome> {
        let body: Value = serde_json::from_slice(raw_payload)
            .map_err(|e| DomainError::MalformedPayload(format!("body is not valid JSON: {}", e)))?;

        self.verify(&canonical_bytes(&body)?, provided_signature)?;

        let payload: WebhookPayload = serde_json::from_value(body)
            .map_err(|e| DomainError::MalformedPayload(e.to_string()))?;
        let event = payload.event.unwrap_or_default();

        let event_type = event.event_type.unwrap_or_default();
        if event_type != LOCATION_UPDATED_EVENT {
            debug!(event_type = %event_type, "ignoring webhook event type");
            return Ok(IngestOutcome::Ignored(event_type));
        }

        let external_id = payload
            .user
            .and_then(|user| user.external_id)
            .as_deref()
            .and_then(normalize_external_id)
            .map(str::to_string)
            .ok_or(DomainError::MissingIdentifier)?;

        let (longitude, latitude) = event
            .location
            .and_then(|location| location.coordinates)
            .as_deref()
            .and_then(lon_lat)
            .ok_or_else(|| {
                DomainError::MalformedPayload(
                    "event.location.coordinates must be [lon, lat]".to_string(),
                )
            })?;

        let mut position = RawPosition::new(
            external_id,
            latitude,
            longitude,
            event.updated_at.unwrap_or_default(),
        );
        position.accuracy = event.location_accuracy.as_ref().and_then(Value::as_f64);

        Ok(IngestOutcome::Position(position))
    }

    /// Hex-encoded signature for a payload, as the provider would send it
    pub fn sign(&self, raw_payload: &[u8]) -> DomainResult<String> {
        let body: Value = serde_json::from_slice(raw_payload)
            .map_err(|e| DomainError::MalformedPayload(format!("body is not valid JSON: {}", e)))?;
        let mut mac = self.mac()?;
        mac.update(&canonical_bytes(&body)?);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, canonical: &[u8], provided_signature: &str) -> DomainResult<()> {
        let provided = hex::decode(provided_signature.trim()).map_err(|_| {
            warn!("webhook signature is not valid hex");
            DomainError::SignatureInvalid
        })?;

        let mut mac = self.mac()?;
        mac.update(canonical);
        mac.verify_slice(&provided).map_err(|_| {
            warn!("webhook signature mismatch");
            DomainError::SignatureInvalid
        })
    }

    fn mac(&self) -> DomainResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| DomainError::InvalidConfiguration(format!("webhook secret: {}", e)))
    }
}

/// Compact JSON with object keys sorted recursively
fn canonical_bytes(value: &Value) -> DomainResult<Vec<u8>> {
    serde_json::to_vec(&sorted(value))
        .map_err(|e| DomainError::MalformedPayload(format!("cannot canonicalize body: {}", e)))
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (key, nested) in entries {
                out.insert(key.clone(), sorted(nested));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn lon_lat(coordinates: &[Value]) -> Option<(f64, f64)> {
    match coordinates {
        [lon, lat] => Some((lon.as_f64()?, lat.as_f64()?)),
        _ => None,
    }
}
