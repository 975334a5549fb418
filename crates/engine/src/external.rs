//! Seam to the external financial system.
//!
//! The engine only knows this contract; `sof_client` implements it over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EngineError, Money};

/// What a commitment inquiry is keyed by.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CommitmentLookup {
    /// Commitment note, `NNNNN/YYYY`.
    Note(String),
    /// Administrative process number.
    Process(String),
    /// Budget line code.
    Line(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitmentQuery {
    pub lookup: CommitmentLookup,
    pub year: i32,
    pub month: u32,
}

/// One row of a commitment inquiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentFact {
    pub line_code: String,
    pub process_id: String,
    pub committed_value: Money,
    pub paid_value: Money,
}

/// Budget inquiry for one project/activity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetQuery {
    pub year: i32,
    pub month: u32,
    pub agency: String,
    /// `"*"` means every unit of the agency.
    pub unit: String,
    pub project_activity: String,
    pub funding_source: String,
}

/// Authoritative figures for the lines matching a [`BudgetQuery`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetedAmount {
    pub initial_value: Money,
    pub current_value: Money,
    pub available_balance: Money,
}

/// Failure reaching the external system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalError {
    /// Transport failure, non-success status, or an unusable body.
    #[error("external ledger unavailable ({status:?}): {detail}")]
    Unavailable { status: Option<u16>, detail: String },
}

impl From<ExternalError> for EngineError {
    fn from(err: ExternalError) -> Self {
        match err {
            ExternalError::Unavailable { status, detail } => {
                EngineError::UpstreamUnavailable { status, detail }
            }
        }
    }
}

#[async_trait]
pub trait ExternalLedger: Send + Sync {
    /// An empty list is a valid answer, not an error.
    async fn fetch_commitments(
        &self,
        query: &CommitmentQuery,
    ) -> Result<Vec<CommitmentFact>, ExternalError>;

    async fn fetch_budgeted_amount(
        &self,
        query: &BudgetQuery,
    ) -> Result<Vec<BudgetedAmount>, ExternalError>;
}
