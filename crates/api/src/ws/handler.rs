//! WebSocket upgrade handler for run sessions.
//!
//! The session identifier in the path is the run id. A connection is only
//! accepted for a manual run that is pending (fresh start) or running
//! (resume after a detach); anything else gets an error frame and a close.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use synchub_core::error::CoreError;
use synchub_core::types::DbId;
use synchub_db::models::run::{Run, RunMode, RunStatus};
use synchub_db::repositories::{ProfileRepo, RunRepo};

use crate::error::AppResult;
use crate::runner::events::status;
use crate::state::AppState;
use crate::ws::frames::{stdin_payload, OutboundFrame};

/// HTTP handler that upgrades the connection to a run session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(run_id): Path<DbId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, run_id))
}

/// Manage a single run session after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Validates the run is connectable and attaches via `SessionManager`.
///   2. Spawns a sender task that forwards frames from the session channel.
///   3. Starts or resumes the interactive process.
///   4. Forwards inbound stdin to the process on the current task.
///   5. Detaches on disconnect, leaving the process running.
async fn handle_socket(socket: WebSocket, state: AppState, run_id: DbId) {
    let run = match RunRepo::find_by_id(state.ledger.pool(), run_id).await {
        Ok(Some(run)) => run,
        Ok(None) => {
            reject(socket, run_id, &format!("Run {run_id} not found")).await;
            return;
        }
        Err(e) => {
            tracing::error!(run_id, error = %e, "Failed to load run for session");
            reject(socket, run_id, "Failed to load run").await;
            return;
        }
    };

    if run.mode != RunMode::Manual || run.status.is_terminal() {
        reject(
            socket,
            run_id,
            &format!(
                "Run {run_id} is not connectable (mode {:?}, status {:?})",
                run.mode, run.status
            ),
        )
        .await;
        return;
    }

    tracing::info!(run_id, profile_id = run.profile_id, "Session connected");
    let mut rx = state.sessions.attach(run_id).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward session channel messages to the WebSocket sink.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(run_id, "Session sink closed");
                break;
            }
        }
    });

    state
        .sessions
        .send_to(run_id, OutboundFrame::status(run_id, status::CONNECTED).to_message())
        .await;

    // A running run means a prior session detached: re-attach without
    // spawning a second process. A pending run starts one now.
    let ready = if run.status == RunStatus::Running {
        state
            .sessions
            .send_to(run_id, OutboundFrame::status(run_id, status::RESUMED).to_message())
            .await;
        true
    } else {
        match start_interactive(&state, &run).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(run_id, error = %e, "Failed to start interactive run");
                state
                    .sessions
                    .send_to(run_id, OutboundFrame::error(run_id, e.to_string()).to_message())
                    .await;
                false
            }
        }
    };

    if ready {
        // Receiver loop: everything textual becomes stdin.
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let input = stdin_payload(&text);
                    state.runner.send_input(run_id, &input).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Pong(_)) => {
                    tracing::trace!(run_id, "Pong received");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(run_id, error = %e, "Session receive error");
                    break;
                }
            }
        }
    }

    // Detach only: the process (if any) keeps running and logging, and a
    // later connection can resume it.
    state.sessions.detach(run_id).await;
    send_task.abort();
    tracing::info!(run_id, "Session detached");
}

/// Claim the run through the ledger and spawn the interactive process.
///
/// Any failure after a successful start terminalizes the run so it is
/// never left `running` without a process.
async fn start_interactive(state: &AppState, run: &Run) -> AppResult<()> {
    let pool = state.ledger.pool();
    let profile = ProfileRepo::find_by_id(pool, run.profile_id)
        .await?
        .ok_or(CoreError::profile_not_found(run.profile_id))?;
    let accounts = ProfileRepo::accounts_for(pool, profile.id).await?;

    state.ledger.start(run.id).await?;

    let log_path = match state
        .ledger
        .assign_log_path(run.id, &state.config.data_dir)
        .await
    {
        Ok(path) => path,
        Err(e) => {
            state
                .ledger
                .complete(
                    run.id,
                    RunStatus::Failed,
                    None,
                    Some("Failed to assign run log file"),
                )
                .await?;
            return Err(e);
        }
    };

    if let Err(e) = state
        .runner
        .spawn_interactive(&profile, &accounts, run.id, log_path)
        .await
    {
        state
            .ledger
            .complete(run.id, RunStatus::Failed, None, Some(&e.to_string()))
            .await?;
        return Err(e.into());
    }
    Ok(())
}

/// Send an error frame on a not-yet-attached socket and close it.
async fn reject(mut socket: WebSocket, run_id: DbId, message: &str) {
    tracing::warn!(run_id, message, "Rejecting session");
    let frame = OutboundFrame::error(run_id, message);
    let _ = socket.send(frame.to_message()).await;
    let _ = socket.send(Message::Close(None)).await;
}
