//! Run ledger: the single arbiter of run state.
//!
//! Owns the authoritative lifecycle of every run and the
//! one-running-run-per-profile invariant. The invariant is enforced twice:
//! a mutex-guarded in-memory set of busy profile IDs is the fast path, and
//! the `uq_runs_profile_running` partial unique index is the durable
//! backstop that survives process restarts and multi-process deployments.
//! No component may spawn a child process without first transitioning a
//! run to `running` through this ledger.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use synchub_core::error::CoreError;
use synchub_core::retention;
use synchub_core::types::DbId;
use synchub_db::models::run::{Run, RunMode, RunStatus};
use synchub_db::repositories::{ProfileRepo, RunRepo};
use synchub_db::DbPool;

use crate::error::{is_unique_violation, AppError, AppResult};
use crate::runner::registry::RunRegistry;

/// Name of the partial unique index backing the profile lock.
pub const PROFILE_RUNNING_CONSTRAINT: &str = "uq_runs_profile_running";

/// Message written to runs cancelled by an operator.
const CANCEL_MESSAGE: &str = "Cancelled by user";

// ---------------------------------------------------------------------------
// In-memory profile guard
// ---------------------------------------------------------------------------

/// Mutex-guarded set of profile IDs that currently hold the run lock.
///
/// Owned exclusively by [`RunLedger`]; exposed as its own type so the
/// acquire/release semantics can be exercised directly in tests.
#[derive(Default)]
pub struct ProfileGuard {
    inner: Mutex<HashSet<DbId>>,
}

impl ProfileGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the lock for a profile. Returns `false` if it is already held.
    pub fn try_acquire(&self, profile_id: DbId) -> bool {
        self.inner.lock().expect("guard mutex poisoned").insert(profile_id)
    }

    /// Release the lock for a profile. Releasing an unheld lock is a no-op.
    pub fn release(&self, profile_id: DbId) {
        self.inner.lock().expect("guard mutex poisoned").remove(&profile_id);
    }

    /// Whether the lock is currently held for a profile.
    pub fn is_held(&self, profile_id: DbId) -> bool {
        self.inner
            .lock()
            .expect("guard mutex poisoned")
            .contains(&profile_id)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The run ledger. Cheap to share behind an `Arc`.
pub struct RunLedger {
    pool: DbPool,
    guard: ProfileGuard,
    registry: Arc<RunRegistry>,
    /// Execution bound used when sweeping before a busy check.
    run_timeout: Duration,
}

impl RunLedger {
    pub fn new(pool: DbPool, registry: Arc<RunRegistry>, run_timeout_secs: u64) -> Self {
        Self {
            pool,
            guard: ProfileGuard::new(),
            registry,
            run_timeout: Duration::seconds(run_timeout_secs as i64),
        }
    }

    /// Create a new pending run for a profile.
    pub async fn create(&self, profile_id: DbId, mode: RunMode) -> AppResult<Run> {
        ProfileRepo::find_by_id(&self.pool, profile_id)
            .await?
            .ok_or(CoreError::profile_not_found(profile_id))?;

        let run = RunRepo::create(&self.pool, profile_id, mode).await?;
        tracing::info!(run_id = run.id, profile_id, mode = ?mode, "Run created");
        Ok(run)
    }

    /// Transition a pending run to `running`, claiming the profile lock.
    ///
    /// Fails with `AlreadyRunning` if the profile's lock is held, either in
    /// this process (guard set) or durably (partial unique index, when
    /// another process got there first).
    pub async fn start(&self, run_id: DbId) -> AppResult<Run> {
        let run = RunRepo::find_by_id(&self.pool, run_id)
            .await?
            .ok_or(CoreError::run_not_found(run_id))?;

        if !self.guard.try_acquire(run.profile_id) {
            return Err(CoreError::AlreadyRunning(run.profile_id).into());
        }

        match RunRepo::mark_running(&self.pool, run_id).await {
            Ok(Some(run)) => {
                tracing::info!(run_id, profile_id = run.profile_id, "Run started");
                Ok(run)
            }
            Ok(None) => {
                self.guard.release(run.profile_id);
                Err(CoreError::Validation(format!("Run {run_id} is not pending")).into())
            }
            Err(e) if is_unique_violation(&e, PROFILE_RUNNING_CONSTRAINT) => {
                self.guard.release(run.profile_id);
                Err(CoreError::AlreadyRunning(run.profile_id).into())
            }
            Err(e) => {
                self.guard.release(run.profile_id);
                Err(e.into())
            }
        }
    }

    /// Write a terminal state for a run and release the profile lock.
    ///
    /// Idempotent with respect to sweeps: if the run was already
    /// terminalized elsewhere the database write is skipped but the guard
    /// is still released.
    pub async fn complete(
        &self,
        run_id: DbId,
        status: RunStatus,
        exit_code: Option<i32>,
        error_message: Option<&str>,
    ) -> AppResult<()> {
        let run = RunRepo::find_by_id(&self.pool, run_id)
            .await?
            .ok_or(CoreError::run_not_found(run_id))?;

        let updated =
            RunRepo::complete(&self.pool, run_id, status, exit_code, error_message).await?;
        self.guard.release(run.profile_id);

        if updated {
            tracing::info!(
                run_id,
                profile_id = run.profile_id,
                status = ?status,
                exit_code,
                "Run completed"
            );
        } else {
            tracing::debug!(run_id, "Run was already terminal, skipping completion write");
        }
        Ok(())
    }

    /// Cancel a run. Only legal while it is `running`.
    ///
    /// Marks the run failed with a user-cancellation message, releases the
    /// profile lock, and terminates the OS process if one is still
    /// registered -- all steps inside this single ledger call so a
    /// cancelled run can neither keep its lock nor keep its process.
    pub async fn cancel(&self, run_id: DbId) -> AppResult<Run> {
        let run = RunRepo::find_by_id(&self.pool, run_id)
            .await?
            .ok_or(CoreError::run_not_found(run_id))?;

        if run.status != RunStatus::Running {
            return Err(CoreError::Validation(format!(
                "Run {run_id} is {status:?} and cannot be cancelled; only running runs can",
                status = run.status
            ))
            .into());
        }

        RunRepo::complete(&self.pool, run_id, RunStatus::Failed, None, Some(CANCEL_MESSAGE))
            .await?;
        self.guard.release(run.profile_id);
        let killed = self.registry.kill(run_id).await;

        tracing::info!(run_id, profile_id = run.profile_id, killed, "Run cancelled");
        RunRepo::find_by_id(&self.pool, run_id)
            .await?
            .ok_or_else(|| AppError::InternalError(format!("Run {run_id} vanished")))
    }

    /// Whether a profile currently has a running run.
    ///
    /// Sweeps stale runs first, then consults the durable store rather than
    /// the in-memory guard, so a crashed sibling process cannot wedge a
    /// profile forever.
    pub async fn is_profile_running(&self, profile_id: DbId) -> AppResult<bool> {
        self.sweep_stale(self.run_timeout).await?;
        Ok(RunRepo::has_running_for_profile(&self.pool, profile_id).await?)
    }

    /// Force-fail every running run older than `max_age`. Returns the
    /// number of runs swept.
    pub async fn sweep_stale(&self, max_age: Duration) -> AppResult<usize> {
        let cutoff = retention::cutoff(Utc::now(), max_age);
        let swept = RunRepo::sweep_stale(&self.pool, cutoff).await?;

        for (run_id, profile_id) in &swept {
            self.guard.release(*profile_id);
            // Reap the process if it is somehow still alive.
            self.registry.kill(*run_id).await;
            tracing::warn!(run_id, profile_id, "Stale run force-failed");
        }
        Ok(swept.len())
    }

    /// Delete terminal runs older than `days` days along with their log
    /// files. Returns `(runs_deleted, logs_deleted)`.
    ///
    /// A log file that cannot be removed is logged and skipped; the run row
    /// is deleted regardless.
    pub async fn purge_older_than(&self, days: i64) -> AppResult<(u64, u64)> {
        let cutoff = retention::cutoff(Utc::now(), Duration::days(days));
        let purgeable = RunRepo::list_purgeable(&self.pool, cutoff).await?;

        let mut logs_deleted: u64 = 0;
        let mut ids = Vec::with_capacity(purgeable.len());
        for (run_id, log_path) in purgeable {
            ids.push(run_id);
            let Some(path) = log_path else { continue };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => logs_deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(run_id, path = %path, error = %e, "Failed to delete run log");
                }
            }
        }

        let runs_deleted = RunRepo::delete_by_ids(&self.pool, &ids).await?;
        tracing::info!(runs_deleted, logs_deleted, days, "Purged old runs");
        Ok((runs_deleted, logs_deleted))
    }

    /// Assign and record the log file for a run.
    pub async fn assign_log_path(&self, run_id: DbId, data_dir: &Path) -> AppResult<PathBuf> {
        let path = data_dir.join(format!("run-{run_id}.log"));
        RunRepo::set_log_path(&self.pool, run_id, &path.to_string_lossy()).await?;
        Ok(path)
    }

    /// Look up a run.
    pub async fn get(&self, run_id: DbId) -> AppResult<Run> {
        RunRepo::find_by_id(&self.pool, run_id)
            .await?
            .ok_or_else(|| CoreError::run_not_found(run_id).into())
    }

    /// The backing pool, for collaborators that need read access.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The guard set is the fast path of the one-run-per-profile invariant;
    // these tests exercise it without a database.

    #[test]
    fn acquire_then_release_cycles() {
        let guard = ProfileGuard::new();

        assert!(guard.try_acquire(1));
        assert!(guard.is_held(1));
        assert!(!guard.try_acquire(1));

        guard.release(1);
        assert!(!guard.is_held(1));
        assert!(guard.try_acquire(1));
    }

    #[test]
    fn second_acquire_fails_until_first_completes() {
        let guard = ProfileGuard::new();

        // First run claims the profile.
        assert!(guard.try_acquire(7));
        // A second run for the same profile is rejected.
        assert!(!guard.try_acquire(7));
        // First run completes, releasing the lock.
        guard.release(7);
        // A third run may now claim it.
        assert!(guard.try_acquire(7));
    }

    #[test]
    fn profiles_are_independent() {
        let guard = ProfileGuard::new();

        assert!(guard.try_acquire(1));
        assert!(guard.try_acquire(2));
        guard.release(1);
        assert!(!guard.is_held(1));
        assert!(guard.is_held(2));
    }

    #[test]
    fn releasing_unheld_lock_is_noop() {
        let guard = ProfileGuard::new();
        guard.release(42);
        assert!(guard.try_acquire(42));
    }

    #[test]
    fn concurrent_acquires_admit_exactly_one() {
        let guard = std::sync::Arc::new(ProfileGuard::new());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let guard = std::sync::Arc::clone(&guard);
            handles.push(std::thread::spawn(move || guard.try_acquire(5)));
        }

        let acquired: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(acquired, 1);
    }
}
