//! Run retention and staleness bounds.
//!
//! Pure constants and cutoff arithmetic used by both the run ledger and the
//! scheduler, so the two always agree on what "stale" and "purgeable" mean.

use chrono::Duration;

use crate::types::Timestamp;

/// Hard execution bound for a single unattended run.
pub const RUN_TIMEOUT_SECS: u64 = 10 * 60;

/// Age after which a `running` run is considered orphaned during the
/// crash-recovery sweep at startup.
pub const STALE_SWEEP_MAX_AGE_SECS: u64 = 30 * 60;

/// Terminal runs older than this many days are deleted by weekly
/// housekeeping, along with their log files.
pub const RETENTION_DAYS: i64 = 30;

/// Compute the cutoff instant for an age bound: anything that started
/// strictly before the returned timestamp is past the bound.
pub fn cutoff(now: Timestamp, max_age: Duration) -> Timestamp {
    now - max_age
}

/// Whether a run that started at `started_at` is past the given age bound
/// as of `now`. The boundary itself is not past: a run aged exactly
/// `max_age` is kept.
pub fn is_past(started_at: Timestamp, now: Timestamp, max_age: Duration) -> bool {
    started_at < cutoff(now, max_age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn run_younger_than_bound_is_kept() {
        let now = Utc::now();
        let started = now - Duration::minutes(9);
        assert!(!is_past(started, now, Duration::minutes(10)));
    }

    #[test]
    fn run_older_than_bound_is_past() {
        let now = Utc::now();
        let started = now - Duration::minutes(11);
        assert!(is_past(started, now, Duration::minutes(10)));
    }

    #[test]
    fn run_exactly_at_bound_is_kept() {
        let now = Utc::now();
        let started = now - Duration::minutes(10);
        assert!(!is_past(started, now, Duration::minutes(10)));
    }

    #[test]
    fn retention_cutoff_selects_only_older_runs() {
        let now = Utc::now();
        let cut = cutoff(now, Duration::days(RETENTION_DAYS));

        let old = now - Duration::days(31);
        let recent = now - Duration::days(29);
        assert!(old < cut);
        assert!(recent > cut);
    }
}
