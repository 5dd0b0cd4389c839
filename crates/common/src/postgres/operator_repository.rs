use crate::domain::{DomainError, DomainResult, Operator, OperatorRepository, OperatorStatus};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

const LIST_ACTIVE_OPERATORS_SQL: &str = "SELECT id, external_id, first_name, last_name, role, region, area, status
     FROM operators
     WHERE lower(trim(status)) = 'active'
     ORDER BY id";

/// Operator row as stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct OperatorRow {
    pub id: i64,
    pub external_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub region: Option<String>,
    pub area: Option<String>,
    pub status: String,
}

impl From<OperatorRow> for Operator {
    fn from(row: OperatorRow) -> Self {
        Operator {
            id: row.id,
            external_id: row.external_id,
            first_name: row.first_name,
            last_name: row.last_name,
            role: row.role,
            region: row.region,
            area: row.area,
            status: OperatorStatus::parse(&row.status),
        }
    }
}

/// PostgreSQL implementation of OperatorRepository trait
#[derive(Clone)]
pub struct PostgresOperatorRepository {
    client: PostgresClient,
}

impl PostgresOperatorRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OperatorRepository for PostgresOperatorRepository {
    #[instrument(skip(self))]
    async fn list_active_operators(&self) -> DomainResult<Vec<Operator>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(LIST_ACTIVE_OPERATORS_SQL, &[])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let operators: Vec<Operator> = rows
            .into_iter()
            .map(|row| {
                OperatorRow {
                    id: row.get(0),
                    external_id: row.get(1),
                    first_name: row.get(2),
                    last_name: row.get(3),
                    role: row.get(4),
                    region: row.get(5),
                    area: row.get(6),
                    status: row.get(7),
                }
                .into()
            })
            .collect();

        debug!(count = operators.len(), "loaded active operators");

        Ok(operators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_parses_status() {
        let row = OperatorRow {
            id: 7,
            external_id: Some("E7".to_string()),
            first_name: Some("Ravi".to_string()),
            last_name: None,
            role: None,
            region: Some("south".to_string()),
            area: None,
            status: "Active".to_string(),
        };

        let operator: Operator = row.into();
        assert_eq!(operator.id, 7);
        assert_eq!(operator.status, OperatorStatus::Active);
        assert_eq!(operator.region.as_deref(), Some("south"));
    }

    #[test]
    fn test_active_filter_matches_status_parsing() {
        for stored in ["active", "Active", " ACTIVE "] {
            assert_eq!(OperatorStatus::parse(stored), OperatorStatus::Active);
        }
        assert!(LIST_ACTIVE_OPERATORS_SQL.contains("lower(trim(status)) = 'active'"));
    }
}
