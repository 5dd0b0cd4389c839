use super::trips::{decode_trips, TripsEnvelope};
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, PositionProvider, RawPosition};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone)]
pub struct RadarConfig {
    /// Base URL, e.g. `https://api.radar.io/v1`
    pub api_url: String,
    /// Sent verbatim in the `Authorization` header
    pub secret_key: String,
    pub request_timeout: Duration,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.radar.io/v1".to_string(),
            secret_key: String::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Fetches last known positions from the Radar trips API
///
/// One bulk request per call, filtered by the comma-joined identifier list.
/// Provider-level failures are logged and degrade to an empty result.
pub struct RadarPositionProvider {
    client: reqwest::Client,
    trips_url: String,
    secret_key: String,
}

impl RadarPositionProvider {
    pub fn new(config: RadarConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            trips_url: format!("{}/trips", config.api_url.trim_end_matches('/')),
            secret_key: config.secret_key,
        })
    }

    async fn request_trips(&self, external_ids: &BTreeSet<String>) -> DomainResult<Vec<Value>> {
        let joined = external_ids
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .get(&self.trips_url)
            .header(reqwest::header::AUTHORIZATION, &self.secret_key)
            .query(&[("externalId", joined.as_str()), ("includeLocations", "true")])
            .send()
            .await
            .map_err(|e| DomainError::ProviderUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::ProviderUnavailable(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let envelope: TripsEnvelope = response.json().await.map_err(|e| {
            DomainError::ProviderUnavailable(format!("undecodable trips response: {}", e))
        })?;

        Ok(envelope.trips)
    }
}

#[async_trait]
impl PositionProvider for RadarPositionProvider {
    #[instrument(skip(self, external_ids), fields(requested = external_ids.len()))]
    async fn fetch_positions(&self, external_ids: &BTreeSet<String>) -> Vec<RawPosition> {
        if external_ids.is_empty() {
            debug!("no identifiers requested, skipping provider call");
            return Vec::new();
        }

        if self.secret_key.is_empty() {
            error!("radar secret key is not configured, skipping provider call");
            return Vec::new();
        }

        match self.request_trips(external_ids).await {
            Ok(trips) => {
                let received = trips.len();
                let positions = decode_trips(trips, external_ids);
                debug!(received, decoded = positions.len(), "fetched positions from provider");
                positions
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "provider poll failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct SeenRequest {
        authorization: Option<String>,
        params: HashMap<String, String>,
    }

    #[derive(Clone)]
    struct FakeRadar {
        status: StatusCode,
        body: Value,
        seen: Arc<Mutex<Vec<SeenRequest>>>,
    }

    async fn trips(
        State(radar): State<FakeRadar>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        radar.seen.lock().unwrap().push(SeenRequest {
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            params,
        });
        (radar.status, Json(radar.body.clone())).into_response()
    }

    async fn spawn_fake_radar(status: StatusCode, body: Value) -> (String, Arc<Mutex<Vec<SeenRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route("/v1/trips", get(trips)).with_state(FakeRadar {
            status,
            body,
            seen: seen.clone(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/v1", addr), seen)
    }

    fn provider(api_url: String, secret_key: &str) -> RadarPositionProvider {
        RadarPositionProvider::new(RadarConfig {
            api_url,
            secret_key: secret_key.to_string(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_positions_sends_bulk_request() {
        let (url, seen) = spawn_fake_radar(
            StatusCode::OK,
            json!({
                "trips": [{
                    "externalId": "E1",
                    "user": { "lastLocation": {
                        "coordinates": [77.6, 12.9],
                        "createdAt": "2024-01-01T00:00:00Z"
                    }}
                }]
            }),
        )
        .await;

        let positions = provider(url, "prj_test_sk")
            .fetch_positions(&ids(&["E2", "E1"]))
            .await;

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].external_id, "E1");
        assert_eq!(positions[0].latitude, 12.9);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].authorization.as_deref(), Some("prj_test_sk"));
        assert_eq!(seen[0].params.get("externalId").map(String::as_str), Some("E1,E2"));
        assert_eq!(
            seen[0].params.get("includeLocations").map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_empty_identifier_set_makes_no_request() {
        let (url, seen) = spawn_fake_radar(StatusCode::OK, json!({ "trips": [] })).await;

        let positions = provider(url, "prj_test_sk")
            .fetch_positions(&BTreeSet::new())
            .await;

        assert!(positions.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_secret_makes_no_request() {
        let (url, seen) = spawn_fake_radar(StatusCode::OK, json!({ "trips": [] })).await;

        let positions = provider(url, "").fetch_positions(&ids(&["E1"])).await;

        assert!(positions.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorization_failure_degrades_to_empty() {
        let (url, seen) = spawn_fake_radar(
            StatusCode::UNAUTHORIZED,
            json!({ "meta": { "code": 401, "message": "Unauthorized" } }),
        )
        .await;

        let positions = provider(url, "wrong").fetch_positions(&ids(&["E1"])).await;

        assert!(positions.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_envelope_degrades_to_empty() {
        let (url, _seen) = spawn_fake_radar(StatusCode::OK, json!({ "trips": "nope" })).await;

        let positions = provider(url, "prj_test_sk")
            .fetch_positions(&ids(&["E1"]))
            .await;

        assert!(positions.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_provider_degrades_to_empty() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let positions = provider(format!("http://{}/v1", addr), "prj_test_sk")
            .fetch_positions(&ids(&["E1"]))
            .await;

        assert!(positions.is_empty());
    }
}
