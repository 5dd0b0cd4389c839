use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// Display name used when an operator has no usable name parts
pub const UNKNOWN_OPERATOR_NAME: &str = "unknown";

/// Lifecycle status of an operator as recorded by the operator store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorStatus {
    Active,
    Inactive,
}

impl OperatorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorStatus::Active => "active",
            OperatorStatus::Inactive => "inactive",
        }
    }

    /// Anything other than `active` is treated as inactive
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("active") {
            OperatorStatus::Active
        } else {
            OperatorStatus::Inactive
        }
    }
}

/// Domain entity for a trackable field operator
///
/// Owned by the external operator store; the relay only ever reads snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub id: i64,
    pub external_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub region: Option<String>,
    pub area: Option<String>,
    pub status: OperatorStatus,
}

impl Operator {
    pub fn is_active(&self) -> bool {
        self.status == OperatorStatus::Active
    }

    /// External identifier with surrounding whitespace removed, `None` if blank
    pub fn normalized_external_id(&self) -> Option<&str> {
        self.external_id.as_deref().and_then(normalize_external_id)
    }

    /// Joins the non-blank name parts with a single space
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Trim an external identifier, rejecting blank values
pub fn normalize_external_id(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Snapshot of active operators indexed by external identifier
///
/// Inactive operators and operators without an external identifier are never
/// indexed. The first operator wins when an identifier is duplicated.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    operators: Vec<Operator>,
    by_external_id: HashMap<String, usize>,
}

impl Roster {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_operators(operators: Vec<Operator>) -> Self {
        let mut roster = Self::default();

        for operator in operators {
            if !operator.is_active() {
                continue;
            }

            let Some(external_id) = operator.normalized_external_id().map(str::to_string) else {
                continue;
            };

            if let Some(&existing) = roster.by_external_id.get(&external_id) {
                warn!(
                    external_id = %external_id,
                    kept_operator_id = roster.operators[existing].id,
                    dropped_operator_id = operator.id,
                    "duplicate external id among active operators, keeping first"
                );
                continue;
            }

            roster
                .by_external_id
                .insert(external_id, roster.operators.len());
            roster.operators.push(operator);
        }

        roster
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    /// Case-sensitive lookup after trimming the candidate identifier
    pub fn find_by_external_id(&self, external_id: &str) -> Option<&Operator> {
        let key = normalize_external_id(external_id)?;
        self.by_external_id
            .get(key)
            .map(|&index| &self.operators[index])
    }

    pub fn external_ids(&self) -> BTreeSet<String> {
        self.by_external_id.keys().cloned().collect()
    }
}

/// Repository trait for reading the operator roster
/// Infrastructure layer (e.g., postgres) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait OperatorRepository: Send + Sync {
    /// List every operator whose status is `active`
    async fn list_active_operators(&self) -> DomainResult<Vec<Operator>>;
}
