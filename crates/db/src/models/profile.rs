//! Profile entity and its service accounts.
//!
//! Profiles are managed elsewhere; the orchestration core consumes them
//! read-only. Stored passwords are ciphertext and only ever decrypted
//! immediately before a spawn.

use serde::Serialize;
use sqlx::FromRow;
use synchub_core::types::{DbId, Timestamp};

/// A row from the `profiles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Profile {
    pub id: DbId,
    pub name: String,
    pub enabled: bool,
    /// Five-field cron expression, minute/hour may be `?`. `None` means the
    /// profile is never scheduled.
    pub cron_expr: Option<String>,
    /// Per-profile working directory handed to the sync tool.
    pub sync_dir: String,
    /// Optional capabilities passed to the tool as `--enable <name>`.
    pub features: Vec<String>,
    /// Requested tool verbosity: `debug`, `info`, `warn`, or `error`.
    pub log_level: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `profile_accounts` table: one external-service account
/// attached to a profile.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProfileAccount {
    pub id: DbId,
    pub profile_id: DbId,
    /// External service this account belongs to.
    pub service: String,
    pub username: String,
    /// Hex-encoded AES-GCM ciphertext. Never serialized to clients.
    #[serde(skip_serializing)]
    pub password_enc: String,
    pub created_at: Timestamp,
}
