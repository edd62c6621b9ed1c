//! Repository for the `runs` table.
//!
//! Status transitions are guarded in SQL (`WHERE status = ...`) so every
//! transition is atomic and monotonic at the database level; the partial
//! unique index `uq_runs_profile_running` is the durable backstop for the
//! one-running-run-per-profile invariant.

use sqlx::PgPool;
use synchub_core::types::{DbId, Timestamp};

use crate::models::run::{Run, RunMode, RunStatus};

/// Column list for `runs` queries.
const COLUMNS: &str = "\
    id, profile_id, mode, status, started_at, finished_at, \
    exit_code, error_message, log_path, created_at";

/// Provides CRUD operations for runs.
pub struct RunRepo;

impl RunRepo {
    /// Insert a new pending run.
    pub async fn create(
        pool: &PgPool,
        profile_id: DbId,
        mode: RunMode,
    ) -> Result<Run, sqlx::Error> {
        let query = format!(
            "INSERT INTO runs (profile_id, mode) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(profile_id)
            .bind(mode)
            .fetch_one(pool)
            .await
    }

    /// Find a run by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Run>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM runs WHERE id = $1");
        sqlx::query_as::<_, Run>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Transition a pending run to `running` and stamp `started_at`.
    ///
    /// Returns `None` if the run is not currently pending. A violation of
    /// `uq_runs_profile_running` surfaces as a database error for the
    /// ledger to classify.
    pub async fn mark_running(pool: &PgPool, run_id: DbId) -> Result<Option<Run>, sqlx::Error> {
        let query = format!(
            "UPDATE runs SET status = 'running', started_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(run_id)
            .fetch_optional(pool)
            .await
    }

    /// Write a terminal state for a running run.
    ///
    /// Returns `false` if the run was not `running` (already terminal or
    /// never started); terminal rows are never rewritten.
    pub async fn complete(
        pool: &PgPool,
        run_id: DbId,
        status: RunStatus,
        exit_code: Option<i32>,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE runs \
             SET status = $2, exit_code = $3, error_message = $4, finished_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(run_id)
        .bind(status)
        .bind(exit_code)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the log file assigned to a run.
    pub async fn set_log_path(
        pool: &PgPool,
        run_id: DbId,
        log_path: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE runs SET log_path = $2 WHERE id = $1")
            .bind(run_id)
            .bind(log_path)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Whether the profile currently has a `running` run in the durable
    /// store.
    pub async fn has_running_for_profile(
        pool: &PgPool,
        profile_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM runs WHERE profile_id = $1 AND status = 'running'",
        )
        .bind(profile_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    /// Force-fail every `running` run that started before `cutoff`.
    ///
    /// Returns `(run_id, profile_id)` for each swept run so the caller can
    /// release the in-memory guard and reap any orphaned process. Runs
    /// younger than the cutoff are never touched.
    pub async fn sweep_stale(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<(DbId, DbId)>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE runs \
             SET status = 'failed', finished_at = NOW(), \
                 error_message = 'Run exceeded its execution bound and was marked failed' \
             WHERE status = 'running' AND started_at < $1 \
             RETURNING id, profile_id",
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }

    /// List terminal runs that started before `cutoff`, with their log
    /// paths, for retention cleanup.
    pub async fn list_purgeable(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<(DbId, Option<String>)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, log_path FROM runs \
             WHERE status IN ('success', 'failed') AND started_at < $1",
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }

    /// Delete runs by ID. Returns the number of rows removed.
    pub async fn delete_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM runs WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List the most recent runs for a profile.
    pub async fn list_for_profile(
        pool: &PgPool,
        profile_id: DbId,
        limit: i64,
    ) -> Result<Vec<Run>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM runs \
             WHERE profile_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(profile_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
