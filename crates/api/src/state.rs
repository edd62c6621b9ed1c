use std::sync::Arc;

use crate::config::ServerConfig;
use crate::ledger::RunLedger;
use crate::runner::RunSupervisor;
use crate::scheduler::Scheduler;
use crate::ws::SessionManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: synchub_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Run ledger: the single arbiter of run state.
    pub ledger: Arc<RunLedger>,
    /// Process supervisor for the external sync tool.
    pub runner: Arc<RunSupervisor>,
    /// Attached run sessions.
    pub sessions: Arc<SessionManager>,
    /// Cron scheduler.
    pub scheduler: Arc<Scheduler>,
}
