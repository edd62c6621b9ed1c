//! Read-only repository for the `profiles` and `profile_accounts` tables.
//!
//! Profile CRUD lives outside the orchestration core; this repo only loads
//! what the scheduler and process supervisor need.

use sqlx::PgPool;
use synchub_core::types::DbId;

use crate::models::profile::{Profile, ProfileAccount};

/// Column list for `profiles` queries.
const COLUMNS: &str = "\
    id, name, enabled, cron_expr, sync_dir, features, log_level, \
    created_at, updated_at";

/// Provides read access to profiles.
pub struct ProfileRepo;

impl ProfileRepo {
    /// Find a profile by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Profile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM profiles WHERE id = $1");
        sqlx::query_as::<_, Profile>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List every enabled profile that has a cron expression, i.e. the set
    /// the scheduler derives its timers from.
    pub async fn list_enabled_scheduled(pool: &PgPool) -> Result<Vec<Profile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM profiles \
             WHERE enabled = TRUE AND cron_expr IS NOT NULL \
             ORDER BY id"
        );
        sqlx::query_as::<_, Profile>(&query).fetch_all(pool).await
    }

    /// Service accounts attached to a profile, in a stable order.
    pub async fn accounts_for(
        pool: &PgPool,
        profile_id: DbId,
    ) -> Result<Vec<ProfileAccount>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, profile_id, service, username, password_enc, created_at \
             FROM profile_accounts \
             WHERE profile_id = $1 \
             ORDER BY service",
        )
        .bind(profile_id)
        .fetch_all(pool)
        .await
    }
}
