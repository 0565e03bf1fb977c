use super::Store;
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use common::jobs::SyncPhase;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

/// Persisted progress record of one bulk synchronization run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTask {
    pub correlation_id: String,
    /// Account that started the run; only it may poll the task.
    pub account_id: String,
    pub phase: SyncPhase,
    pub binding_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<SyncTask> {
    let phase: String = row.get(2)?;
    Ok(SyncTask {
        correlation_id: row.get(0)?,
        account_id: row.get(1)?,
        phase: phase
            .parse()
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(error)))?,
        binding_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl Store {
    pub(crate) fn insert_task(&self, task: &SyncTask) -> Result<(), SyncError> {
        self.conn().execute(
            "INSERT INTO sync_tasks
                (correlation_id, account_id, phase, binding_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                task.correlation_id,
                task.account_id,
                task.phase.as_str(),
                task.binding_id,
                task.created_at
            ],
        )?;
        Ok(())
    }

    /// Moves a task from `expected` to `next`; returns false when the stored phase is no
    /// longer `expected`.
    pub(crate) fn update_task_phase(
        &self,
        correlation_id: &str,
        expected: SyncPhase,
        next: SyncPhase,
        binding_id: Option<&str>,
    ) -> Result<bool, SyncError> {
        let changed = self.conn().execute(
            "UPDATE sync_tasks
             SET phase = ?1, binding_id = COALESCE(?2, binding_id), updated_at = ?3
             WHERE correlation_id = ?4 AND phase = ?5",
            params![
                next.as_str(),
                binding_id,
                Utc::now(),
                correlation_id,
                expected.as_str()
            ],
        )?;
        Ok(changed == 1)
    }

    /// Marks a task failed, creating the record if the run died before creating it.
    /// A transferred task is left untouched.
    pub(crate) fn fail_task(&self, correlation_id: &str, account_id: &str) -> Result<(), SyncError> {
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO sync_tasks
                (correlation_id, account_id, phase, binding_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?4)
             ON CONFLICT(correlation_id) DO UPDATE SET
                phase = excluded.phase,
                updated_at = excluded.updated_at
             WHERE sync_tasks.phase <> ?5",
            params![
                correlation_id,
                account_id,
                SyncPhase::Failed.as_str(),
                now,
                SyncPhase::Transferred.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn task(&self, correlation_id: &str) -> Result<Option<SyncTask>, SyncError> {
        let task = self
            .conn()
            .query_row(
                "SELECT correlation_id, account_id, phase, binding_id, created_at
                 FROM sync_tasks WHERE correlation_id = ?1",
                params![correlation_id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }
}
