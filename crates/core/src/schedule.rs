//! Cron schedule descriptors with randomized placeholders.
//!
//! Profiles store standard five-field cron expressions in which the minute
//! and hour fields may be the literal `?`. A `?` is resolved to a uniformly
//! random value in the field's range exactly once, when the schedule is
//! registered, so unattended load is spread across profiles without the
//! firing time drifting between occurrences. The original expression and
//! the resolved one are kept as two distinct values; the original is what
//! operators see and edit, the resolved one is what actually fires.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::CoreError;

/// Placeholder token accepted in the minute and hour fields.
pub const RANDOM_PLACEHOLDER: &str = "?";

/// Inclusive upper bound of the minute field.
const MINUTE_MAX: u8 = 59;

/// Inclusive upper bound of the hour field.
const HOUR_MAX: u8 = 23;

// ---------------------------------------------------------------------------
// Typed descriptor
// ---------------------------------------------------------------------------

/// A minute or hour field: either passed through verbatim or drawn at
/// resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Any non-placeholder cron token (`5`, `*/15`, `1-10`, ...), kept as-is.
    Fixed(String),
    /// The `?` placeholder; resolved to a random integer in `0..=max`.
    Random { max: u8 },
}

impl Field {
    fn parse(token: &str, max: u8) -> Self {
        if token == RANDOM_PLACEHOLDER {
            Field::Random { max }
        } else {
            Field::Fixed(token.to_string())
        }
    }

    fn resolve(&self) -> String {
        match self {
            Field::Fixed(token) => token.clone(),
            Field::Random { max } => rand::rng().random_range(0..=*max).to_string(),
        }
    }

    /// Substitute a neutral value for validation purposes.
    fn neutral(&self) -> String {
        match self {
            Field::Fixed(token) => token.clone(),
            Field::Random { .. } => "0".to_string(),
        }
    }
}

/// A parsed five-field cron expression with placeholder-aware minute and
/// hour fields. Parsing does not draw any randomness; call
/// [`ScheduleSpec::resolve`] for that.
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    original: String,
    minute: Field,
    hour: Field,
    /// Day-of-month, month, day-of-week, verbatim.
    rest: [String; 3],
}

impl ScheduleSpec {
    /// Parse a five-field cron expression, accepting `?` in the minute and
    /// hour fields only.
    ///
    /// The non-placeholder parts are validated by substituting a neutral
    /// value for each placeholder and test-parsing the result, so a
    /// syntactically broken expression is rejected here rather than at the
    /// first firing.
    pub fn parse(expr: &str) -> Result<Self, CoreError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CoreError::InvalidSchedule {
                expr: expr.to_string(),
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        let spec = Self {
            original: fields.join(" "),
            minute: Field::parse(fields[0], MINUTE_MAX),
            hour: Field::parse(fields[1], HOUR_MAX),
            rest: [
                fields[2].to_string(),
                fields[3].to_string(),
                fields[4].to_string(),
            ],
        };

        // Reject placeholders outside the minute/hour fields.
        if spec.rest.iter().any(|f| f == RANDOM_PLACEHOLDER) {
            return Err(CoreError::InvalidSchedule {
                expr: expr.to_string(),
                reason: "`?` is only allowed in the minute and hour fields".to_string(),
            });
        }

        let neutral = spec.render(&spec.minute.neutral(), &spec.hour.neutral());
        parse_cron(&neutral).map_err(|reason| CoreError::InvalidSchedule {
            expr: expr.to_string(),
            reason,
        })?;

        Ok(spec)
    }

    /// The expression as stored, placeholders intact.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Draw random values for any placeholder fields and produce a concrete
    /// schedule. Each call draws independently.
    pub fn resolve(&self) -> ResolvedSchedule {
        let resolved = self.render(&self.minute.resolve(), &self.hour.resolve());
        let schedule = parse_cron(&resolved)
            .expect("a spec that validated with neutral values resolves cleanly");
        ResolvedSchedule {
            original: self.original.clone(),
            resolved,
            schedule,
        }
    }

    fn render(&self, minute: &str, hour: &str) -> String {
        format!(
            "{minute} {hour} {} {} {}",
            self.rest[0], self.rest[1], self.rest[2]
        )
    }
}

/// Validate an expression without keeping the parse result.
pub fn validate(expr: &str) -> Result<(), CoreError> {
    ScheduleSpec::parse(expr).map(|_| ())
}

// ---------------------------------------------------------------------------
// Resolved schedule
// ---------------------------------------------------------------------------

/// A concrete cron schedule: placeholders substituted, ready to compute
/// firing times.
#[derive(Debug, Clone)]
pub struct ResolvedSchedule {
    original: String,
    resolved: String,
    schedule: cron::Schedule,
}

impl ResolvedSchedule {
    /// The stored expression, placeholders intact. Shown to operators.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The concrete five-field expression that fires.
    pub fn resolved(&self) -> &str {
        &self.resolved
    }

    /// The next firing instant strictly after `from`, or `None` if the
    /// expression has no future occurrences.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// Duration from `now` until the next firing, or `None` if there is no
    /// future occurrence.
    pub fn until_next(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        let next = self.next_after(now)?;
        (next - now).to_std().ok()
    }
}

// the `cron` crate requires 6-field (second-granularity) expressions,
// so we prepend "0" to standard 5-field minute-granularity inputs
fn parse_cron(expr: &str) -> Result<cron::Schedule, String> {
    let normalized = format!("0 {expr}");
    cron::Schedule::from_str(&normalized).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn fixed_expression_passes_through() {
        let spec = ScheduleSpec::parse("15 3 * * *").unwrap();
        let resolved = spec.resolve();
        assert_eq!(resolved.resolved(), "15 3 * * *");
        assert_eq!(resolved.original(), "15 3 * * *");
    }

    #[test]
    fn placeholders_resolve_within_field_ranges() {
        let spec = ScheduleSpec::parse("? ? * * *").unwrap();
        let resolved = spec.resolve();

        let fields: Vec<&str> = resolved.resolved().split(' ').collect();
        assert_eq!(fields.len(), 5);
        let minute: u8 = fields[0].parse().expect("minute is numeric");
        let hour: u8 = fields[1].parse().expect("hour is numeric");
        assert!(minute <= 59);
        assert!(hour <= 23);
        assert_eq!(&fields[2..], &["*", "*", "*"]);
    }

    #[test]
    fn resolutions_are_independent_draws() {
        let spec = ScheduleSpec::parse("? ? * * *").unwrap();
        let re = regex::Regex::new(r"^\d{1,2} \d{1,2} \* \* \*$").unwrap();

        // Two resolutions both match the concrete shape. With 1440 possible
        // (minute, hour) pairs per draw, 64 draws yielding a single distinct
        // value would mean the draws are not independent.
        let mut distinct = std::collections::HashSet::new();
        for _ in 0..64 {
            let resolved = spec.resolve();
            assert!(re.is_match(resolved.resolved()));
            distinct.insert(resolved.resolved().to_string());
        }
        assert!(distinct.len() > 1);
    }

    #[test]
    fn original_retained_alongside_resolved() {
        let spec = ScheduleSpec::parse("? 4 * * 1").unwrap();
        let resolved = spec.resolve();
        assert_eq!(resolved.original(), "? 4 * * 1");
        assert_ne!(resolved.resolved(), resolved.original());
        assert!(resolved.resolved().ends_with(" 4 * * 1"));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_matches!(
            ScheduleSpec::parse("* * *"),
            Err(CoreError::InvalidSchedule { .. })
        );
    }

    #[test]
    fn rejects_garbage_expression() {
        assert_matches!(
            ScheduleSpec::parse("invalid"),
            Err(CoreError::InvalidSchedule { .. })
        );
        assert_matches!(
            ScheduleSpec::parse("not a cron at all!"),
            Err(CoreError::InvalidSchedule { .. })
        );
    }

    #[test]
    fn rejects_placeholder_outside_minute_and_hour() {
        assert_matches!(
            ScheduleSpec::parse("0 0 ? * *"),
            Err(CoreError::InvalidSchedule { .. })
        );
    }

    #[test]
    fn rejects_out_of_range_fixed_minute() {
        assert_matches!(
            ScheduleSpec::parse("61 * * * *"),
            Err(CoreError::InvalidSchedule { .. })
        );
    }

    #[test]
    fn next_after_advances() {
        let spec = ScheduleSpec::parse("*/5 * * * *").unwrap();
        let resolved = spec.resolve();
        let now = Utc::now();
        let next = resolved.next_after(now).unwrap();
        assert!(next > now);
        assert!(next <= now + chrono::Duration::minutes(5));
    }

    #[test]
    fn until_next_is_positive() {
        let spec = ScheduleSpec::parse("* * * * *").unwrap();
        let resolved = spec.resolve();
        let wait = resolved.until_next(Utc::now()).unwrap();
        assert!(wait <= std::time::Duration::from_secs(60));
    }
}
