use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    AllocationFilter, AllocationView, BudgetLine, CreateAllocationCmd, EngineError,
    PlannedAllocation, ResultEngine, UpdateAllocationCmd,
    hierarchy::{ensure_planning_open, resolve_hierarchy},
    util::{ensure_positive_value, normalize_required},
};

use super::{Engine, registry::apply_delta, with_uow};

/// A line that passed the existence check but is gone inside the unit of
/// work was removed concurrently by the import process.
fn mid_transaction(err: EngineError) -> EngineError {
    match err {
        EngineError::LineMissing { year, line_code } => {
            error!(
                year,
                %line_code,
                "budget line vanished inside an allocation transaction"
            );
            EngineError::InvariantViolation(format!(
                "budget line {line_code}/{year} changed concurrently, try again"
            ))
        }
        other => other,
    }
}

impl Engine {
    /// Return one allocation, removed or not.
    pub async fn allocation(&self, id: Uuid) -> ResultEngine<PlannedAllocation> {
        with_uow!(self, self.budgets.allocations, |uow| {
            uow.allocation(id)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(format!("allocation {id}")))
        })
    }

    /// Creates an allocation and adds its value to the line's planned total.
    ///
    /// The line must exist and the program owning the resolved goal must
    /// have planning open for the year. Over-commitment is reported on the
    /// line but never blocks the write.
    pub async fn create_allocation(&self, cmd: CreateAllocationCmd) -> ResultEngine<Uuid> {
        ensure_positive_value(cmd.value)?;
        let user_id = normalize_required(&cmd.user_id, "user id")?;
        let line_code = normalize_required(&cmd.line_code, "line code")?;

        self.require_line(cmd.year, &line_code).await?;
        let hierarchy = resolve_hierarchy(self.hierarchy.as_ref(), cmd.hierarchy).await?;
        ensure_planning_open(self.planning.as_ref(), hierarchy.program_id, cmd.year).await?;

        let allocation = PlannedAllocation::new(
            cmd.year,
            line_code,
            cmd.value,
            &hierarchy,
            user_id,
            Utc::now(),
        )?;

        let line = with_uow!(self, self.budgets.allocations, |uow| {
            uow.insert_allocation(&allocation).await?;
            apply_delta(
                uow.as_mut(),
                allocation.year,
                &allocation.line_code,
                allocation.value,
            )
            .await
            .map_err(mid_transaction)
        })?;

        info!(
            id = %allocation.id,
            year = allocation.year,
            line_code = %allocation.line_code,
            value = %allocation.value,
            over_committed = line.over_committed,
            "planned allocation created"
        );
        Ok(allocation.id)
    }

    /// Changes value, line and/or hierarchy node of an active allocation.
    ///
    /// Moving to another line subtracts the old value from the old line and
    /// adds the new value to the new one; staying on the same line applies a
    /// single `new - old` delta. Both happen in the same unit of work as the
    /// row update.
    pub async fn update_allocation(&self, cmd: UpdateAllocationCmd) -> ResultEngine<()> {
        let user_id = normalize_required(&cmd.user_id, "user id")?;
        if let Some(value) = cmd.value {
            ensure_positive_value(value)?;
        }
        let new_line_code = cmd
            .line_code
            .as_deref()
            .map(|code| normalize_required(code, "line code"))
            .transpose()?;

        let current = self.allocation(cmd.id).await?;
        if !current.is_active() {
            return Err(EngineError::KeyNotFound(format!("allocation {}", cmd.id)));
        }
        if let Some(line_code) = &new_line_code
            && *line_code != current.line_code
        {
            self.require_line(current.year, line_code).await?;
        }
        let hierarchy = match cmd.hierarchy {
            Some(reference) => Some(resolve_hierarchy(self.hierarchy.as_ref(), reference).await?),
            None => None,
        };
        let program_id = match &hierarchy {
            Some(resolved) => resolved.program_id,
            None => self.hierarchy.goal_program(current.goal_id).await?,
        };
        ensure_planning_open(self.planning.as_ref(), program_id, current.year).await?;

        let now = Utc::now();
        let (old, updated) = with_uow!(self, self.budgets.allocations, |uow| {
            let mut allocation = uow
                .allocation(cmd.id)
                .await?
                .filter(PlannedAllocation::is_active)
                .ok_or_else(|| EngineError::KeyNotFound(format!("allocation {}", cmd.id)))?;
            let old = allocation.clone();

            if let Some(value) = cmd.value {
                allocation.value = value;
            }
            if let Some(line_code) = &new_line_code {
                allocation.line_code = line_code.clone();
            }
            if let Some(resolved) = &hierarchy {
                allocation.set_hierarchy(resolved);
            }
            allocation.updated_by = Some(user_id.clone());
            allocation.updated_at = Some(now);
            uow.update_allocation(&allocation).await?;

            if old.line_code == allocation.line_code {
                let delta = allocation.value - old.value;
                if !delta.is_zero() {
                    apply_delta(uow.as_mut(), old.year, &old.line_code, delta)
                        .await
                        .map_err(mid_transaction)?;
                }
            } else {
                apply_delta(uow.as_mut(), old.year, &old.line_code, -old.value)
                    .await
                    .map_err(mid_transaction)?;
                apply_delta(
                    uow.as_mut(),
                    allocation.year,
                    &allocation.line_code,
                    allocation.value,
                )
                .await
                .map_err(mid_transaction)?;
            }
            Ok((old, allocation))
        })?;

        info!(
            id = %updated.id,
            from_line = %old.line_code,
            to_line = %updated.line_code,
            from_value = %old.value,
            to_value = %updated.value,
            "planned allocation updated"
        );
        Ok(())
    }

    /// Soft-deletes an allocation and subtracts its value from its line.
    ///
    /// Removing an already removed allocation does nothing.
    pub async fn remove_allocation(&self, id: Uuid, user_id: &str) -> ResultEngine<()> {
        let user_id = normalize_required(user_id, "user id")?;
        let now = Utc::now();

        let removed = with_uow!(self, self.budgets.allocations, |uow| {
            let allocation = uow
                .allocation(id)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(format!("allocation {id}")))?;
            let removed = allocation.is_active() && uow.remove_allocation(id, &user_id, now).await?;
            if removed {
                apply_delta(
                    uow.as_mut(),
                    allocation.year,
                    &allocation.line_code,
                    -allocation.value,
                )
                .await
                .map_err(mid_transaction)?;
            }
            Ok(removed.then_some(allocation))
        })?;

        match removed {
            Some(allocation) => info!(
                %id,
                line_code = %allocation.line_code,
                value = %allocation.value,
                "planned allocation removed"
            ),
            None => info!(%id, "planned allocation already removed"),
        }
        Ok(())
    }

    /// Active allocations matching `filter`, each with its line's figures.
    pub async fn list_allocations(
        &self,
        filter: AllocationFilter,
    ) -> ResultEngine<Vec<AllocationView>> {
        with_uow!(self, self.budgets.allocations, |uow| {
            let rows = uow.allocations(&filter).await?;
            let mut lines: BTreeMap<String, BudgetLine> = BTreeMap::new();
            let mut views = Vec::with_capacity(rows.len());
            for allocation in rows {
                if !lines.contains_key(&allocation.line_code) {
                    let line = uow
                        .line(allocation.year, &allocation.line_code)
                        .await?
                        .ok_or_else(|| EngineError::LineMissing {
                            year: allocation.year,
                            line_code: allocation.line_code.clone(),
                        })?;
                    lines.insert(allocation.line_code.clone(), line);
                }
                let line = lines
                    .get(&allocation.line_code)
                    .cloned()
                    .ok_or_else(|| EngineError::KeyNotFound(allocation.line_code.clone()))?;
                views.push(AllocationView { allocation, line });
            }
            Ok(views)
        })
    }
}
