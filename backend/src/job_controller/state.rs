//! Tracks the progress of bulk synchronization runs.
//!
//! A run is executed outside the request/response cycle (see
//! `backend/src/pipeline/orchestrator.rs`), so clients poll its progress through
//! `GET /api/projects/sync/status`. Progress is persisted in the `sync_tasks` table so that
//! the audit trail survives restarts.
//!
//! The main components are:
//! - `TaskTracker`: a clonable handle shared by the orchestrator and the HTTP layer. It
//!   only ever moves a task forward through `SyncPhase`.
//! - `mark_failed`: usable from error paths that only know the correlation id.
//!
//! Every task belongs to the account that started it, and `query` answers only that
//! account.

use crate::error::SyncError;
use crate::store::{Store, SyncTask};
use chrono::Utc;
use common::jobs::SyncPhase;
use log::{info, warn};

/// A thread-safe, shareable handle over the persisted sync tasks.
#[derive(Clone)]
pub struct TaskTracker {
    store: Store,
}

impl TaskTracker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Creates the task for `correlation_id` in phase `Connected`, owned by `account_id`.
    pub fn create(&self, correlation_id: &str, account_id: &str) -> Result<SyncTask, SyncError> {
        let task = SyncTask {
            correlation_id: correlation_id.to_string(),
            account_id: account_id.to_string(),
            phase: SyncPhase::Connected,
            binding_id: None,
            created_at: Utc::now(),
        };
        self.store.insert_task(&task)?;
        info!("sync task {} is {}", correlation_id, task.phase);
        Ok(task)
    }

    /// Persists the transition of `task` to `next`, optionally linking the binding.
    ///
    /// Only the immediate successor (or `Failed`) is accepted, and the stored phase must
    /// still equal `task.phase`.
    pub fn advance(
        &self,
        task: &mut SyncTask,
        next: SyncPhase,
        binding_id: Option<&str>,
    ) -> Result<(), SyncError> {
        if !task.phase.can_advance_to(next) {
            return Err(SyncError::InvalidTransition {
                from: task.phase,
                to: next,
            });
        }
        if !self
            .store
            .update_task_phase(&task.correlation_id, task.phase, next, binding_id)?
        {
            let stored = self.query(&task.correlation_id, &task.account_id)?;
            warn!(
                "sync task {} changed underneath tracker (stored {:?})",
                task.correlation_id, stored
            );
            return Err(SyncError::InvalidTransition {
                from: stored.unwrap_or(task.phase),
                to: next,
            });
        }

        task.phase = next;
        if let Some(id) = binding_id {
            task.binding_id = Some(id.to_string());
        }
        info!("sync task {} is {}", task.correlation_id, next);
        Ok(())
    }

    /// Marks the task failed by correlation id alone; the record is created for
    /// `account_id` if the run never got that far.
    pub fn mark_failed(&self, correlation_id: &str, account_id: &str) -> Result<(), SyncError> {
        self.store.fail_task(correlation_id, account_id)?;
        warn!("sync task {} is {}", correlation_id, SyncPhase::Failed);
        Ok(())
    }

    /// Current phase; `None` means the task is unknown, has not started or belongs to
    /// another account.
    pub fn query(
        &self,
        correlation_id: &str,
        account_id: &str,
    ) -> Result<Option<SyncPhase>, SyncError> {
        Ok(self
            .store
            .task(correlation_id)?
            .filter(|task| task.account_id == account_id)
            .map(|task| task.phase))
    }
}
