use chrono::{DateTime, NaiveDateTime, Utc};
use common::domain::{
    normalize_external_id, CanonicalLocationEvent, DomainError, DomainResult, RawPosition, Roster,
    UNKNOWN_OPERATOR_NAME,
};
use common::garde::validate_struct;

const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Joins a raw sample to its roster entry and builds the canonical event
///
/// Pure: reads no clock and no shared state, so normalizing the same
/// (sample, roster) pair always yields the same event.
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_role: String,
}

impl Normalizer {
    pub fn new(default_role: impl Into<String>) -> Self {
        Self {
            default_role: default_role.into(),
        }
    }

    pub fn normalize(
        &self,
        raw: &RawPosition,
        roster: &Roster,
    ) -> DomainResult<CanonicalLocationEvent> {
        let operator = roster
            .find_by_external_id(&raw.external_id)
            .ok_or_else(|| DomainError::NoMatchingOperator(raw.external_id.trim().to_string()))?;

        let role = operator
            .role
            .as_deref()
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .unwrap_or(self.default_role.as_str())
            .to_string();

        let event = CanonicalLocationEvent {
            operator_id: operator.id,
            name: operator
                .display_name()
                .unwrap_or_else(|| UNKNOWN_OPERATOR_NAME.to_string()),
            external_id: operator
                .external_id
                .as_deref()
                .and_then(normalize_external_id)
                .map(str::to_string),
            role,
            region: operator.region.clone(),
            area: operator.area.clone(),
            latitude: raw.latitude,
            longitude: raw.longitude,
            recorded_at: parse_recorded_at(&raw.timestamp)?,
            active: operator.is_active(),
            accuracy: finite(raw.accuracy),
            speed: finite(raw.speed),
            heading: finite(raw.heading),
            altitude: finite(raw.altitude),
            battery_level: finite(raw.battery_level),
        };

        validate_struct(&event)?;

        Ok(event)
    }
}

/// RFC 3339 first, then a zone-less timestamp read as UTC
pub fn parse_recorded_at(value: &str) -> DomainResult<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, NAIVE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            DomainError::schema_violation(
                "recorded_at",
                format!("unparseable timestamp '{}'", value),
            )
        })
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
