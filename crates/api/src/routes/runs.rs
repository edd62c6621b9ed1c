//! Run trigger, status, and cancellation routes.
//!
//! `POST /profiles/{id}/runs` is the manual trigger path. An interactive
//! run is created pending and driven through the WebSocket session
//! endpoint; a non-interactive one starts executing in the background
//! immediately and the response returns the pending run for polling.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use synchub_core::error::CoreError;
use synchub_core::types::DbId;
use synchub_db::models::run::{Run, RunMode};
use synchub_db::repositories::ProfileRepo;

use crate::error::AppResult;
use crate::state::AppState;

/// Request body for `POST /profiles/{id}/runs`.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerRun {
    /// When true, the run waits for a session to attach instead of
    /// executing unattended.
    #[serde(default)]
    pub interactive: bool,
}

/// POST /profiles/{id}/runs -- create a manual run.
async fn trigger_run(
    State(state): State<AppState>,
    Path(profile_id): Path<DbId>,
    body: Option<Json<TriggerRun>>,
) -> AppResult<(StatusCode, Json<Run>)> {
    let input = body.map(|Json(input)| input).unwrap_or_default();

    let run = state.ledger.create(profile_id, RunMode::Manual).await?;

    if !input.interactive {
        // Execute in the background; the caller polls the run for status.
        let pool = state.pool.clone();
        let runner = state.runner.clone();
        let run_id = run.id;
        tokio::spawn(async move {
            let profile = match ProfileRepo::find_by_id(&pool, profile_id).await {
                Ok(Some(profile)) => profile,
                Ok(None) => {
                    tracing::error!(profile_id, run_id, "Profile vanished before manual run");
                    return;
                }
                Err(e) => {
                    tracing::error!(profile_id, run_id, error = %e, "Failed to load profile");
                    return;
                }
            };
            let accounts = match ProfileRepo::accounts_for(&pool, profile_id).await {
                Ok(accounts) => accounts,
                Err(e) => {
                    tracing::error!(profile_id, run_id, error = %e, "Failed to load accounts");
                    return;
                }
            };
            match runner
                .run_unattended_to_completion(&profile, &accounts, run_id)
                .await
            {
                Ok(outcome) => {
                    tracing::info!(run_id, outcome = ?outcome, "Manual run finished");
                }
                Err(e) => {
                    tracing::error!(run_id, error = %e, "Manual run failed");
                }
            }
        });
    }

    Ok((StatusCode::CREATED, Json(run)))
}

/// GET /runs/{id} -- fetch one run.
async fn get_run(State(state): State<AppState>, Path(run_id): Path<DbId>) -> AppResult<Json<Run>> {
    Ok(Json(state.ledger.get(run_id).await?))
}

/// POST /runs/{id}/cancel -- cancel a running run.
///
/// Marks the run failed with a cancellation message and terminates its
/// process. Pending and terminal runs are rejected.
async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
) -> AppResult<Json<Run>> {
    Ok(Json(state.ledger.cancel(run_id).await?))
}

/// GET /profiles/{id}/runs -- recent runs for a profile.
async fn list_runs(
    State(state): State<AppState>,
    Path(profile_id): Path<DbId>,
) -> AppResult<Json<Vec<Run>>> {
    ProfileRepo::find_by_id(&state.pool, profile_id)
        .await?
        .ok_or(CoreError::profile_not_found(profile_id))?;
    let runs =
        synchub_db::repositories::RunRepo::list_for_profile(&state.pool, profile_id, 50).await?;
    Ok(Json(runs))
}

/// Mount run routes under `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles/{id}/runs", post(trigger_run).get(list_runs))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/cancel", post(cancel_run))
}
