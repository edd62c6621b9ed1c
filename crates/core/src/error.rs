//! Domain error taxonomy.
//!
//! Every layer above this crate wraps or maps these variants; HTTP mapping
//! lives in the API crate's `AppError`.

use crate::types::DbId;

/// Domain-level errors for run orchestration.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup failed.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// The profile exists but is disabled and cannot be scheduled or run.
    #[error("Profile {0} is disabled")]
    ProfileDisabled(DbId),

    /// The profile already has an active run.
    #[error("Profile {0} already has a run in progress")]
    AlreadyRunning(DbId),

    /// A cron expression could not be parsed.
    #[error("Invalid schedule `{expr}`: {reason}")]
    InvalidSchedule { expr: String, reason: String },

    /// The sync tool asked for interactive input while running unattended.
    ///
    /// Distinguished from a generic failure because it has a specific
    /// remediation: re-run the profile in interactive mode.
    #[error("The sync tool requires interactive re-authentication; start an interactive run for this profile")]
    RequiresInteractiveAuth,

    /// The run exceeded its execution bound and was terminated.
    #[error("Run timed out after {0} seconds")]
    Timeout(u64),

    /// Spawning or talking to the child process failed.
    #[error("Process error: {0}")]
    Process(String),

    /// Encrypting or decrypting credential material failed.
    ///
    /// Carries only the name of the failing field, never ciphertext or
    /// partial plaintext.
    #[error("Credential error for {field}: {reason}")]
    Credential {
        field: String,
        reason: &'static str,
    },

    /// An unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a profile lookup failure.
    pub fn profile_not_found(id: DbId) -> Self {
        Self::NotFound {
            entity: "profile",
            id,
        }
    }

    /// Shorthand for a run lookup failure.
    pub fn run_not_found(id: DbId) -> Self {
        Self::NotFound { entity: "run", id }
    }
}
