use common::domain::{OperatorRepository, Roster};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Reads the current set of active operators for one unit of work
///
/// Store failures never leave this type: they are logged and surface as an
/// empty roster, which downstream stages treat as "nothing to do".
pub struct RosterResolver {
    operator_repository: Arc<dyn OperatorRepository>,
}

impl RosterResolver {
    pub fn new(operator_repository: Arc<dyn OperatorRepository>) -> Self {
        Self {
            operator_repository,
        }
    }

    #[instrument(skip(self))]
    pub async fn active_operators(&self) -> Roster {
        match self.operator_repository.list_active_operators().await {
            Ok(operators) => {
                let fetched = operators.len();
                let roster = Roster::from_operators(operators);
                debug!(
                    fetched,
                    indexed = roster.len(),
                    "resolved active operator roster"
                );
                roster
            }
            Err(e) => {
                warn!(
                    error = %e,
                    transient = e.is_transient(),
                    "failed to resolve operator roster, treating as empty"
                );
                Roster::empty()
            }
        }
    }
}
