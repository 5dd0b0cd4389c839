use crate::domain::WebhookOutcome;
use crate::transport::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use common::domain::DomainError;
use tracing::{debug, warn};

/// `POST /api/live-location`
///
/// Every rejection ends here as a 4xx; nothing is propagated to the caller
/// beyond the status and a short message.
pub async fn live_location(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(&state.signature_header)
        .and_then(|value| value.to_str().ok());

    match state.webhook_service.handle(&body, signature).await {
        Ok(WebhookOutcome::Published(_)) => {
            (StatusCode::OK, "Location updated successfully.").into_response()
        }
        Ok(WebhookOutcome::Ignored(event_type)) => {
            debug!(event_type = %event_type, "webhook acknowledged without processing");
            (StatusCode::OK, "Event ignored.").into_response()
        }
        Err(DomainError::SignatureInvalid) => {
            warn!("rejected webhook with invalid signature");
            (StatusCode::UNAUTHORIZED, "Invalid webhook signature.").into_response()
        }
        Err(DomainError::MissingIdentifier) => {
            warn!("rejected webhook without external identifier");
            (StatusCode::BAD_REQUEST, "Missing external identifier.").into_response()
        }
        Err(e) => {
            warn!(error = %e, "rejected webhook");
            (StatusCode::BAD_REQUEST, "Invalid webhook signature or data.").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BroadcastLocationPublisher, Normalizer, RosterResolver, WebhookIngestor, WebhookService};
    use crate::transport::{build_router, CorsConfig};
    use axum::body::Body;
    use axum::http::{HeaderName, Request};
    use axum::Router;
    use common::domain::{MockOperatorRepository, Operator, OperatorStatus};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    const SECRET: &str = "S";
    const BODY: &str = r#"{"event":{"location":{"coordinates":[77.6,12.9]},"type":"user.location.updated","updatedAt":"2024-01-01T00:00:00Z"},"user":{"externalId":"E1"}}"#;

    fn asha() -> Operator {
        Operator {
            id: 1,
            external_id: Some("E1".to_string()),
            first_name: Some("Asha".to_string()),
            last_name: Some("Rao".to_string()),
            role: Some("exec".to_string()),
            region: None,
            area: None,
            status: OperatorStatus::Active,
        }
    }

    fn app() -> (Router, BroadcastLocationPublisher) {
        let mut repo = MockOperatorRepository::new();
        repo.expect_list_active_operators()
            .returning(|| Ok(vec![asha()]));

        let publisher = BroadcastLocationPublisher::new(8);
        let service = WebhookService::new(
            WebhookIngestor::new(SECRET),
            Arc::new(RosterResolver::new(Arc::new(repo))),
            Normalizer::new("operator"),
            Arc::new(publisher.clone()),
        );
        let router = build_router(
            AppState {
                webhook_service: Arc::new(service),
                publisher: publisher.clone(),
                signature_header: HeaderName::from_static("x-radar-signature"),
                shutdown: CancellationToken::new(),
            },
            &CorsConfig::default(),
        );
        (router, publisher)
    }

    fn post(body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::post("/api/live-location").header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-radar-signature", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn sign(body: &str) -> Option<String> {
        Some(WebhookIngestor::new(SECRET).sign(body.as_bytes()).unwrap())
    }

    #[tokio::test]
    async fn test_signed_update_is_acknowledged_and_broadcast() {
        let (router, publisher) = app();
        let mut subscriber = publisher.subscribe();

        let response = router.oneshot(post(BODY, sign(BODY))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let event = subscriber.recv().await.unwrap();
        assert_eq!(event.operator_id, 1);
        assert_eq!(event.name, "Asha Rao");
    }

    #[tokio::test]
    async fn test_tampered_body_is_unauthorized() {
        let (router, publisher) = app();
        let mut subscriber = publisher.subscribe();
        let tampered = BODY.replace("\"E1\"", "\"E2\"");

        let response = router.oneshot(post(&tampered, sign(BODY))).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(subscriber.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_signature_header_is_unauthorized() {
        let (router, _publisher) = app();

        let response = router.oneshot(post(BODY, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_bad_request() {
        let (router, _publisher) = app();
        let body = r#"{"event":{"location":{"coordinates":[77.6,12.9]},"type":"user.location.updated","updatedAt":"T"},"user":{}}"#;

        let response = router.oneshot(post(body, sign(body))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let (router, _publisher) = app();

        let response = router
            .oneshot(post("{oops", Some("00".to_string())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ignored_event_is_acknowledged() {
        let (router, publisher) = app();
        let mut subscriber = publisher.subscribe();
        let body = r#"{"event":{"type":"user.stopped_trip"},"user":{"externalId":"E1"}}"#;

        let response = router.oneshot(post(body, sign(body))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(subscriber.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unparseable_timestamp_is_generic_bad_request() {
        let (router, _publisher) = app();
        let body = BODY.replace("2024-01-01T00:00:00Z", "T");

        let response = router.oneshot(post(&body, sign(&body))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"Invalid webhook signature or data.");
    }
}
