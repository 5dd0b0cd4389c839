use crate::domain::parse_recorded_at;
use common::domain::{normalize_external_id, RawPosition};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Response of `GET /trips`; each trip is decoded on its own
#[derive(Debug, Deserialize)]
pub(crate) struct TripsEnvelope {
    #[serde(default)]
    pub trips: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Trip {
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    user: Option<TripUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TripUser {
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    last_location: Option<LastLocation>,
}

/// Optional telemetry stays loosely typed so a bad value only loses that field
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastLocation {
    coordinates: Vec<f64>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    accuracy: Option<Value>,
    #[serde(default)]
    speed: Option<Value>,
    #[serde(default)]
    heading: Option<Value>,
    #[serde(default)]
    altitude: Option<Value>,
    #[serde(default)]
    battery: Option<Value>,
}

fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

/// Decode trips into at most one position per requested identifier
///
/// Undecodable trips, trips without a last location and trips for
/// identifiers that were not requested are dropped individually. When an
/// identifier appears more than once, the sample with the newest parseable
/// `createdAt` wins.
pub(crate) fn decode_trips(trips: Vec<Value>, requested: &BTreeSet<String>) -> Vec<RawPosition> {
    let mut latest: BTreeMap<String, RawPosition> = BTreeMap::new();

    for (index, value) in trips.into_iter().enumerate() {
        let Some(position) = decode_trip(value, index) else {
            continue;
        };

        if !requested.contains(&position.external_id) {
            debug!(external_id = %position.external_id, "trip for unrequested identifier, skipping");
            continue;
        }

        match latest.get(&position.external_id) {
            Some(existing) if !is_newer(&position, existing) => {}
            _ => {
                latest.insert(position.external_id.clone(), position);
            }
        }
    }

    latest.into_values().collect()
}

fn decode_trip(value: Value, index: usize) -> Option<RawPosition> {
    let trip: Trip = match serde_json::from_value(value) {
        Ok(trip) => trip,
        Err(e) => {
            debug!(index, error = %e, "undecodable trip record, skipping");
            return None;
        }
    };

    let user = trip.user?;
    let external_id = trip
        .external_id
        .as_deref()
        .and_then(normalize_external_id)
        .or_else(|| user.external_id.as_deref().and_then(normalize_external_id))?
        .to_string();

    let Some(location) = user.last_location else {
        debug!(external_id = %external_id, "trip has no last location, skipping");
        return None;
    };

    let [longitude, latitude] = location.coordinates[..] else {
        debug!(external_id = %external_id, "trip coordinates are not [lon, lat], skipping");
        return None;
    };

    let mut position = RawPosition::new(
        external_id,
        latitude,
        longitude,
        location
            .created_at
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    );
    position.accuracy = number(location.accuracy.as_ref());
    position.speed = number(location.speed.as_ref());
    position.heading = number(location.heading.as_ref());
    position.altitude = number(location.altitude.as_ref());
    position.battery_level = number(
        location
            .battery
            .as_ref()
            .and_then(|battery| battery.get("level")),
    );

    Some(position)
}

fn is_newer(candidate: &RawPosition, existing: &RawPosition) -> bool {
    match (
        parse_recorded_at(&candidate.timestamp).ok(),
        parse_recorded_at(&existing.timestamp).ok(),
    ) {
        (Some(candidate), Some(existing)) => candidate > existing,
        (Some(_), None) => true,
        _ => false,
    }
}
