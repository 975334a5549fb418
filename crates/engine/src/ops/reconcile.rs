use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    BudgetQuery, BudgetedAmount, CommitmentFact, CommitmentLookup, CommitmentQuery, EngineError,
    ExecutionSnapshot, RealizedValueQuery, ResultEngine, SnapshotKey, UnitOfWork,
    period::{ensure_month, most_recent_applicable_month, note_for_year},
};

use super::{Engine, with_uow};

/// What merging one fact did to the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Merge policy for one fact against the cached row, if any.
pub(crate) fn merge_decision(
    existing: Option<&ExecutionSnapshot>,
    fact: &CommitmentFact,
    month: u32,
) -> MergeOutcome {
    match existing {
        None => MergeOutcome::Inserted,
        Some(snapshot) if snapshot.is_stale(fact, month) => MergeOutcome::Updated,
        Some(_) => MergeOutcome::Unchanged,
    }
}

async fn merge_fact(
    uow: &mut dyn UnitOfWork,
    key: SnapshotKey,
    fact: &CommitmentFact,
    month: u32,
    now: DateTime<Utc>,
) -> ResultEngine<MergeOutcome> {
    let existing = uow.snapshot(&key).await?;
    let outcome = merge_decision(existing.as_ref(), fact, month);
    match (outcome, existing) {
        (MergeOutcome::Inserted, _) => {
            uow.insert_snapshot(&ExecutionSnapshot::from_fact(key, fact, month, now))
                .await?;
        }
        (MergeOutcome::Updated, Some(mut snapshot)) => {
            snapshot.refresh(fact, month, now);
            uow.update_snapshot(&snapshot).await?;
        }
        _ => {}
    }
    Ok(outcome)
}

impl Engine {
    /// Month the external system is queried at for `year`.
    pub fn most_recent_applicable_month(&self, year: i32) -> ResultEngine<u32> {
        most_recent_applicable_month(year, Utc::now(), self.timezone)
    }

    /// Re-fetches a commitment note and merges every returned fact into the
    /// snapshot cache, one unit of work per fact.
    ///
    /// Returns every cached snapshot of the note for the year. An upstream
    /// failure aborts before any write and leaves cached rows untouched.
    pub async fn realized_value_for_note(
        &self,
        query: RealizedValueQuery,
    ) -> ResultEngine<Vec<ExecutionSnapshot>> {
        let year = query.year;
        let note_id = note_for_year(&query.note_id, year)?;
        let month = match query.month {
            Some(month) => ensure_month(month)?,
            None => self.most_recent_applicable_month(year)?,
        };

        let facts = self
            .fetch_commitments(CommitmentLookup::Note(note_id.clone()), year, month)
            .await?;

        for fact in &facts {
            let key = SnapshotKey::for_fact(year, &note_id, fact);
            let outcome = with_uow!(self, self.budgets.reconciliation, |uow| {
                merge_fact(uow.as_mut(), key, fact, month, Utc::now()).await
            })?;
            debug!(
                note_id = %note_id,
                line_code = %fact.line_code,
                process_id = %fact.process_id,
                ?outcome,
                "commitment fact merged"
            );
        }

        let snapshots = with_uow!(self, self.budgets.reconciliation, |uow| {
            uow.snapshots_for_note(year, &note_id).await
        })?;

        if query.single_line {
            let lines: BTreeSet<&str> = facts.iter().map(|f| f.line_code.as_str()).collect();
            if lines.len() > 1 {
                warn!(note_id = %note_id, lines = lines.len(), "note spans more than one line");
                return Err(EngineError::AmbiguousResult(lines.len()));
            }
        }

        info!(
            note_id = %note_id,
            year,
            month,
            facts = facts.len(),
            snapshots = snapshots.len(),
            "commitment note reconciled"
        );
        Ok(snapshots)
    }

    /// Queries the external system without touching the cache.
    pub async fn fetch_commitments(
        &self,
        lookup: CommitmentLookup,
        year: i32,
        month: u32,
    ) -> ResultEngine<Vec<CommitmentFact>> {
        let query = CommitmentQuery {
            lookup,
            year,
            month: ensure_month(month)?,
        };
        debug!(?query, "fetching commitments");
        self.ledger.fetch_commitments(&query).await.map_err(|err| {
            warn!(error = %err, ?query, "external ledger unavailable");
            EngineError::from(err)
        })
    }

    /// Authoritative budgeted figures for a project/activity. Read-only.
    pub async fn fetch_budgeted_amount(
        &self,
        mut query: BudgetQuery,
    ) -> ResultEngine<Vec<BudgetedAmount>> {
        query.month = ensure_month(query.month)?;
        if query.unit.trim().is_empty() {
            query.unit = "*".to_string();
        }
        debug!(?query, "fetching budgeted amounts");
        self.ledger.fetch_budgeted_amount(&query).await.map_err(|err| {
            warn!(error = %err, ?query, "external ledger unavailable");
            EngineError::from(err)
        })
    }
}
