use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    AllocationFilter, BudgetLine, EngineError, ExecutionSnapshot, Money, PlannedAllocation,
    ResultEngine, SnapshotKey, allocations::listing_order,
};

use super::{Store, TxBudget, UnitOfWork};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum RowKey {
    Line(i32, String),
    Allocation(Uuid),
    Snapshot(SnapshotKey),
}

#[derive(Clone, Debug, Default)]
struct Tables {
    lines: BTreeMap<(i32, String), BudgetLine>,
    allocations: HashMap<Uuid, PlannedAllocation>,
    snapshots: BTreeMap<SnapshotKey, ExecutionSnapshot>,
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    /// Bumped on every committed write to a row. Absent means never written.
    versions: HashMap<RowKey, u64>,
}

/// In-memory store with snapshot reads and first-committer-wins commits.
///
/// A unit sees the tables as they were when it began. At commit, any row it
/// wrote that another unit committed in the meantime fails the whole unit
/// with [`EngineError::Conflict`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a budget line, as the import process would.
    pub async fn insert_line(&self, line: BudgetLine) {
        let mut state = self.state.lock().await;
        let key = RowKey::Line(line.year, line.line_code.clone());
        state
            .tables
            .lines
            .insert((line.year, line.line_code.clone()), line);
        *state.versions.entry(key).or_default() += 1;
    }

    /// Drops a budget line, as an out-of-band cleanup would.
    pub async fn delete_line(&self, year: i32, line_code: &str) {
        let mut state = self.state.lock().await;
        state.tables.lines.remove(&(year, line_code.to_string()));
        *state
            .versions
            .entry(RowKey::Line(year, line_code.to_string()))
            .or_default() += 1;
    }

    /// Committed snapshot rows, for assertions.
    pub async fn snapshots(&self) -> Vec<ExecutionSnapshot> {
        let state = self.state.lock().await;
        state.tables.snapshots.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self, budget: TxBudget) -> ResultEngine<Box<dyn UnitOfWork>> {
        let (tables, versions) = {
            let state = tokio::time::timeout(budget.max_wait, self.state.lock())
                .await
                .map_err(|_| {
                    EngineError::Conflict(format!(
                        "lock wait exceeded {} ms",
                        budget.max_wait.as_millis()
                    ))
                })?;
            (state.tables.clone(), state.versions.clone())
        };
        // Let concurrently started units take their snapshot too.
        tokio::task::yield_now().await;
        Ok(Box::new(MemoryUnitOfWork {
            state: Arc::clone(&self.state),
            tables,
            base_versions: versions,
            written: Vec::new(),
        }))
    }
}

struct MemoryUnitOfWork {
    state: Arc<Mutex<State>>,
    tables: Tables,
    base_versions: HashMap<RowKey, u64>,
    written: Vec<RowKey>,
}

impl MemoryUnitOfWork {
    fn touch(&mut self, key: RowKey) {
        if !self.written.contains(&key) {
            self.written.push(key);
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn line(&mut self, year: i32, line_code: &str) -> ResultEngine<Option<BudgetLine>> {
        Ok(self.tables.lines.get(&(year, line_code.to_string())).cloned())
    }

    async fn save_line_totals(&mut self, line: &BudgetLine) -> ResultEngine<()> {
        let stored = self
            .tables
            .lines
            .get_mut(&(line.year, line.line_code.clone()))
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "budget line {}/{} disappeared",
                    line.line_code, line.year
                ))
            })?;
        stored.planned_total = line.planned_total;
        stored.over_committed = line.over_committed;
        self.touch(RowKey::Line(line.year, line.line_code.clone()));
        Ok(())
    }

    async fn active_allocation_sum(&mut self, year: i32, line_code: &str) -> ResultEngine<Money> {
        Ok(self
            .tables
            .allocations
            .values()
            .filter(|a| a.is_active() && a.year == year && a.line_code == line_code)
            .map(|a| a.value)
            .sum())
    }

    async fn allocation(&mut self, id: Uuid) -> ResultEngine<Option<PlannedAllocation>> {
        Ok(self.tables.allocations.get(&id).cloned())
    }

    async fn insert_allocation(&mut self, allocation: &PlannedAllocation) -> ResultEngine<()> {
        if self.tables.allocations.contains_key(&allocation.id) {
            return Err(EngineError::Conflict(format!(
                "allocation {} already exists",
                allocation.id
            )));
        }
        self.tables
            .allocations
            .insert(allocation.id, allocation.clone());
        self.touch(RowKey::Allocation(allocation.id));
        Ok(())
    }

    async fn update_allocation(&mut self, allocation: &PlannedAllocation) -> ResultEngine<()> {
        let stored = self
            .tables
            .allocations
            .get_mut(&allocation.id)
            .ok_or_else(|| EngineError::KeyNotFound(allocation.id.to_string()))?;
        *stored = allocation.clone();
        self.touch(RowKey::Allocation(allocation.id));
        Ok(())
    }

    async fn remove_allocation(
        &mut self,
        id: Uuid,
        removed_by: &str,
        removed_at: DateTime<Utc>,
    ) -> ResultEngine<bool> {
        let Some(stored) = self
            .tables
            .allocations
            .get_mut(&id)
            .filter(|a| a.is_active())
        else {
            return Ok(false);
        };
        stored.removed_by = Some(removed_by.to_string());
        stored.removed_at = Some(removed_at);
        self.touch(RowKey::Allocation(id));
        Ok(true)
    }

    async fn allocations(
        &mut self,
        filter: &AllocationFilter,
    ) -> ResultEngine<Vec<PlannedAllocation>> {
        let mut rows: Vec<PlannedAllocation> = self
            .tables
            .allocations
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        rows.sort_by(listing_order);
        Ok(rows)
    }

    async fn snapshot(&mut self, key: &SnapshotKey) -> ResultEngine<Option<ExecutionSnapshot>> {
        Ok(self.tables.snapshots.get(key).cloned())
    }

    async fn insert_snapshot(&mut self, snapshot: &ExecutionSnapshot) -> ResultEngine<()> {
        let key = snapshot.realized_key();
        if self.tables.snapshots.contains_key(&key) {
            return Err(EngineError::Conflict(format!(
                "snapshot for note {} already exists",
                key.commitment_note_id
            )));
        }
        self.tables.snapshots.insert(key.clone(), snapshot.clone());
        self.touch(RowKey::Snapshot(key));
        Ok(())
    }

    async fn update_snapshot(&mut self, snapshot: &ExecutionSnapshot) -> ResultEngine<()> {
        let key = snapshot.realized_key();
        let stored = self
            .tables
            .snapshots
            .get_mut(&key)
            .ok_or_else(|| EngineError::KeyNotFound(snapshot.id.to_string()))?;
        *stored = snapshot.clone();
        self.touch(RowKey::Snapshot(key));
        Ok(())
    }

    async fn snapshots_for_note(
        &mut self,
        year: i32,
        commitment_note_id: &str,
    ) -> ResultEngine<Vec<ExecutionSnapshot>> {
        Ok(self
            .tables
            .snapshots
            .values()
            .filter(|s| s.year == year && s.commitment_note_id == commitment_note_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> ResultEngine<()> {
        let this = *self;
        let mut state = this.state.lock().await;

        for key in &this.written {
            let current = state.versions.get(key).copied().unwrap_or(0);
            let base = this.base_versions.get(key).copied().unwrap_or(0);
            if current != base {
                return Err(EngineError::Conflict(format!(
                    "{key:?} was modified by a concurrent unit of work"
                )));
            }
        }

        for key in this.written {
            match &key {
                RowKey::Line(year, line_code) => {
                    let (Some(line), Some(stored)) = (
                        this.tables.lines.get(&(*year, line_code.clone())),
                        state.tables.lines.get_mut(&(*year, line_code.clone())),
                    ) else {
                        return Err(EngineError::InvariantViolation(format!(
                            "budget line {line_code}/{year} disappeared"
                        )));
                    };
                    stored.planned_total = line.planned_total;
                    stored.over_committed = line.over_committed;
                }
                RowKey::Allocation(id) => {
                    if let Some(allocation) = this.tables.allocations.get(id) {
                        state.tables.allocations.insert(*id, allocation.clone());
                    }
                }
                RowKey::Snapshot(snapshot_key) => {
                    if let Some(snapshot) = this.tables.snapshots.get(snapshot_key) {
                        state
                            .tables
                            .snapshots
                            .insert(snapshot_key.clone(), snapshot.clone());
                    }
                }
            }
            *state.versions.entry(key).or_default() += 1;
        }
        Ok(())
    }
}
