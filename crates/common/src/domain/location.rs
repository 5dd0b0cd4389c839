use async_trait::async_trait;
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Position sample as supplied by the tracking provider or a webhook
///
/// Ephemeral: lives for a single processing pass and is never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPosition {
    pub external_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
    pub battery_level: Option<f64>,
}

impl RawPosition {
    /// Sample with only the required fields set
    pub fn new(
        external_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            latitude,
            longitude,
            timestamp: timestamp.into(),
            accuracy: None,
            speed: None,
            heading: None,
            altitude: None,
            battery_level: None,
        }
    }
}

/// Validated, broadcast-ready location record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalLocationEvent {
    #[garde(skip)]
    pub operator_id: i64,
    #[garde(length(min = 1))]
    pub name: String,
    #[garde(skip)]
    pub external_id: Option<String>,
    #[garde(length(min = 1))]
    pub role: String,
    #[garde(skip)]
    pub region: Option<String>,
    #[garde(skip)]
    pub area: Option<String>,
    #[garde(custom(finite_number), range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[garde(custom(finite_number), range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[garde(skip)]
    pub recorded_at: DateTime<Utc>,
    #[garde(skip)]
    pub active: bool,
    #[garde(skip)]
    pub accuracy: Option<f64>,
    #[garde(skip)]
    pub speed: Option<f64>,
    #[garde(skip)]
    pub heading: Option<f64>,
    #[garde(skip)]
    pub altitude: Option<f64>,
    #[garde(skip)]
    pub battery_level: Option<f64>,
}

fn finite_number(value: &f64, _ctx: &()) -> garde::Result {
    if value.is_finite() {
        Ok(())
    } else {
        Err(garde::Error::new("must be a finite number"))
    }
}

/// Trait for fetching latest positions from the tracking provider
///
/// Implementations must:
/// - Return an empty sequence for an empty identifier set without a request
/// - Degrade provider-level failures to an empty sequence (logged, never propagated)
/// - Drop individual malformed records without discarding their siblings
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Fetch the last known position for each requested external identifier
    async fn fetch_positions(&self, external_ids: &BTreeSet<String>) -> Vec<RawPosition>;
}

/// Trait for fanning canonical events out to connected subscribers
///
/// Delivery is fire-and-forget: implementations must not block and must not
/// retry. Events published from one caller are delivered in publish order.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait LocationBroadcaster: Send + Sync {
    fn publish(&self, event: &CanonicalLocationEvent);
}
