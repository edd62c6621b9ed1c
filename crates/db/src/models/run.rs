//! Run entity: one execution attempt of the sync tool for a profile.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use synchub_core::types::{DbId, Timestamp};

/// How a run was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "run_mode", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Triggered by an operator (interactive or one-off).
    Manual,
    /// Fired by the scheduler from a profile's cron expression.
    Cron,
}

/// Lifecycle state of a run.
///
/// Transitions are monotonic: `Pending` -> `Running` -> `Success` |
/// `Failed`. A run never leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "run_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }
}

/// A row from the `runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Run {
    pub id: DbId,
    pub profile_id: DbId,
    pub mode: RunMode,
    pub status: RunStatus,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    pub log_path: Option<String>,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(serde_json::to_string(&RunMode::Cron).unwrap(), "\"cron\"");
    }
}
