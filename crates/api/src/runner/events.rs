//! Typed per-run events and terminal outcomes.

use synchub_core::error::CoreError;
use synchub_db::models::run::RunStatus;

/// Capacity of the per-session relay channel. A remote client that falls
/// further behind than this starts losing frames; log persistence is
/// unaffected because the log sink has its own channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Status payload strings sent to session clients.
pub mod status {
    pub const CONNECTED: &str = "connected";
    pub const WAITING_FOR_INPUT: &str = "waiting_for_input";
    pub const RESUMED: &str = "Resumed existing interactive session";

    pub fn completed(exit_code: i32) -> String {
        format!("completed with exit code {exit_code}")
    }

    pub fn failed(exit_code: i32) -> String {
        format!("failed with exit code {exit_code}")
    }
}

/// One event from a supervised process, as consumed by the session relay.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Stdout(String),
    Stderr(String),
    Status(String),
    Error(String),
    /// An OAuth authorization URL spotted in stdout. Surfaced as its own
    /// event type because clients render these specially.
    AuthUrl(String),
}

/// Terminal result of an unattended execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Exit code 0, no prompt detected.
    Success,
    /// Nonzero exit with no special condition.
    Failed { exit_code: i32 },
    /// An interactive-input prompt was detected; the process was killed.
    RequiresInteractiveAuth,
    /// The execution bound elapsed; the process was killed.
    TimedOut { limit_secs: u64 },
    /// The process could not be spawned or its credentials prepared.
    SpawnFailed { message: String },
}

impl RunOutcome {
    /// Map the outcome onto the run's terminal state:
    /// `(status, exit_code, error_message)`.
    pub fn terminal_parts(&self) -> (RunStatus, Option<i32>, Option<String>) {
        match self {
            RunOutcome::Success => (RunStatus::Success, Some(0), None),
            RunOutcome::Failed { exit_code } => (
                RunStatus::Failed,
                Some(*exit_code),
                Some(format!("Sync exited with code {exit_code}")),
            ),
            RunOutcome::RequiresInteractiveAuth => (
                RunStatus::Failed,
                None,
                Some(CoreError::RequiresInteractiveAuth.to_string()),
            ),
            RunOutcome::TimedOut { limit_secs } => (
                RunStatus::Failed,
                None,
                Some(CoreError::Timeout(*limit_secs).to_string()),
            ),
            RunOutcome::SpawnFailed { message } => {
                (RunStatus::Failed, None, Some(message.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_maps_to_exit_zero() {
        let (status, code, message) = RunOutcome::Success.terminal_parts();
        assert_eq!(status, RunStatus::Success);
        assert_eq!(code, Some(0));
        assert!(message.is_none());
    }

    #[test]
    fn prompt_outcome_carries_remediation() {
        let (status, code, message) = RunOutcome::RequiresInteractiveAuth.terminal_parts();
        assert_eq!(status, RunStatus::Failed);
        assert_eq!(code, None);
        let message = message.unwrap();
        assert!(message.contains("interactive"));
    }

    #[test]
    fn status_strings_match_wire_contract() {
        assert_eq!(status::completed(0), "completed with exit code 0");
        assert_eq!(status::failed(3), "failed with exit code 3");
        assert_eq!(status::RESUMED, "Resumed existing interactive session");
    }
}
