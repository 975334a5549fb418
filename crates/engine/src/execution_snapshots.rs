//! Cached execution facts (commitments and payments) per commitment note.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, external::CommitmentFact, util};

/// Unique key of a snapshot row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub year: i32,
    pub line_code: String,
    pub process_id: String,
    pub commitment_note_id: String,
}

impl SnapshotKey {
    pub fn for_fact(year: i32, commitment_note_id: &str, fact: &CommitmentFact) -> Self {
        Self {
            year,
            line_code: fact.line_code.clone(),
            process_id: fact.process_id.clone(),
            commitment_note_id: commitment_note_id.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: Uuid,
    pub year: i32,
    pub line_code: String,
    pub process_id: String,
    pub commitment_note_id: String,
    pub committed_value: Money,
    pub paid_value: Money,
    /// Month (1-12) the external query was run against.
    pub month_used: u32,
    pub valid: bool,
    pub synced_at: DateTime<Utc>,
}

impl ExecutionSnapshot {
    pub fn from_fact(key: SnapshotKey, fact: &CommitmentFact, month: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            year: key.year,
            line_code: key.line_code,
            process_id: key.process_id,
            commitment_note_id: key.commitment_note_id,
            committed_value: fact.committed_value,
            paid_value: fact.paid_value,
            month_used: month,
            valid: true,
            synced_at: now,
        }
    }

    pub fn realized_key(&self) -> SnapshotKey {
        SnapshotKey {
            year: self.year,
            line_code: self.line_code.clone(),
            process_id: self.process_id.clone(),
            commitment_note_id: self.commitment_note_id.clone(),
        }
    }

    /// Whether the cached row disagrees with a fresh fact fetched for `month`.
    pub fn is_stale(&self, fact: &CommitmentFact, month: u32) -> bool {
        !self.valid
            || self.committed_value != fact.committed_value
            || self.paid_value != fact.paid_value
            || self.month_used != month
    }

    /// Overwrites the reported figures and marks the row authoritative.
    pub fn refresh(&mut self, fact: &CommitmentFact, month: u32, now: DateTime<Utc>) {
        self.committed_value = fact.committed_value;
        self.paid_value = fact.paid_value;
        self.month_used = month;
        self.valid = true;
        self.synced_at = now;
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "execution_snapshots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub year: i32,
    pub line_code: String,
    pub process_id: String,
    pub commitment_note_id: String,
    pub committed_value_minor: i64,
    pub paid_value_minor: i64,
    pub month_used: i32,
    pub valid: bool,
    pub synced_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&ExecutionSnapshot> for ActiveModel {
    fn from(snapshot: &ExecutionSnapshot) -> Self {
        Self {
            id: ActiveValue::Set(snapshot.id.to_string()),
            year: ActiveValue::Set(snapshot.year),
            line_code: ActiveValue::Set(snapshot.line_code.clone()),
            process_id: ActiveValue::Set(snapshot.process_id.clone()),
            commitment_note_id: ActiveValue::Set(snapshot.commitment_note_id.clone()),
            committed_value_minor: ActiveValue::Set(snapshot.committed_value.cents()),
            paid_value_minor: ActiveValue::Set(snapshot.paid_value.cents()),
            month_used: ActiveValue::Set(snapshot.month_used as i32),
            valid: ActiveValue::Set(snapshot.valid),
            synced_at: ActiveValue::Set(snapshot.synced_at),
        }
    }
}

impl TryFrom<Model> for ExecutionSnapshot {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let month_used = u32::try_from(model.month_used)
            .ok()
            .filter(|month| (1..=12).contains(month))
            .ok_or_else(|| {
                EngineError::InvalidMonth(u32::try_from(model.month_used).unwrap_or_default())
            })?;
        Ok(Self {
            id: util::parse_uuid(&model.id, "snapshot")?,
            year: model.year,
            line_code: model.line_code,
            process_id: model.process_id,
            commitment_note_id: model.commitment_note_id,
            committed_value: Money::new(model.committed_value_minor),
            paid_value: Money::new(model.paid_value_minor),
            month_used,
            valid: model.valid,
            synced_at: model.synced_at,
        })
    }
}
