use crate::transport::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use common::domain::CanonicalLocationEvent;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Event name on every frame sent to subscribers
pub const LOCATION_UPDATE_EVENT: &str = "locationUpdate";

#[derive(Serialize)]
struct LocationUpdateFrame<'a> {
    event: &'static str,
    data: &'a CanonicalLocationEvent,
}

/// `{"event":"locationUpdate","data":{...}}`
pub fn location_update_frame(event: &CanonicalLocationEvent) -> serde_json::Result<String> {
    serde_json::to_string(&LocationUpdateFrame {
        event: LOCATION_UPDATE_EVENT,
        data: event,
    })
}

/// `GET /ws`
pub async fn location_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let updates = state.publisher.subscribe();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| stream_locations(socket, updates, shutdown))
}

async fn stream_locations(
    mut socket: WebSocket,
    mut updates: Receiver<Arc<CanonicalLocationEvent>>,
    shutdown: CancellationToken,
) {
    info!("subscriber connected");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            update = updates.recv() => match update {
                Ok(event) => {
                    let frame = match location_update_frame(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "failed to encode location update");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagging, skipped location updates");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("subscriber disconnected");
}
