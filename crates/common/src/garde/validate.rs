//! Garde validation utilities.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Validate a struct, mapping the first failure to a `SchemaViolation`
///
/// The violation's `field` is the garde path of the first failing field and
/// the reason lists every message reported for that path.
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| schema_violation_from_report(&report))
}

fn schema_violation_from_report(report: &Report) -> DomainError {
    let Some((first_path, _)) = report.iter().next() else {
        return DomainError::schema_violation("<root>", "validation failed");
    };

    let field = first_path.to_string();
    let reason = report
        .iter()
        .filter(|(path, _)| path.to_string() == field)
        .map(|(_, error)| error.message().to_string())
        .collect::<Vec<_>>()
        .join(", ");

    DomainError::SchemaViolation {
        field: if field.is_empty() {
            "<root>".to_string()
        } else {
            field
        },
        reason,
    }
}
