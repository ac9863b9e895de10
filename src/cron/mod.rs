//! Cron expression engine.
//!
//! Parses 5-field expressions (`minute hour day-of-month month day-of-week`)
//! into per-field bitmask value sets and computes firing instants in
//! arbitrary IANA timezones. Day-of-month and day-of-week combine as a union
//! when both are restricted, as classic cron does.
//!
//! DST policy, observable and deliberate: a local minute erased by a
//! spring-forward gap is skipped and the walk continues to the next civil
//! minute that both matches and exists; a local minute repeated by a
//! fall-back overlap resolves to the earlier occurrence.

mod field;
mod next;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use field::{parse_field, FieldSet, DAY_OF_MONTH, DAY_OF_WEEK, HOUR, MINUTE, MONTH};

/// Walks never exceed this bound; a satisfiable 5-field expression always
/// fires within it, so running past it means the expression is unsatisfiable
/// (e.g. `0 0 31 2 *`).
pub const DEFAULT_HORIZON_DAYS: i64 = 4 * 366;

/// Largest number of firings `preview` will compute.
pub const MAX_PREVIEW: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("expected 5 fields (minute hour day-of-month month day-of-week), found {found}")]
    FieldCount { found: usize },

    #[error("{field} out of range {min}-{max}: {value}")]
    ValueOutOfRange { field: &'static str, value: u32, min: u8, max: u8 },

    #[error("invalid {field} range {start}-{end}: start must not exceed end")]
    InvalidRange { field: &'static str, start: u32, end: u32 },

    #[error("unknown {field} alias '{alias}'")]
    UnknownAlias { field: &'static str, alias: String },

    #[error("invalid {field} step '{step}'")]
    InvalidStep { field: &'static str, step: String },

    #[error("empty {field} entry")]
    EmptyField { field: &'static str },

    #[error("no firing within the look-ahead horizon for '{expression}'")]
    NoFutureFiring { expression: String },
}

/// A parsed 5-field cron expression.
///
/// Equality compares value sets and the day-field restriction flags, not the
/// source text, so `0-59 * * * *` equals `* * * * *` except for the
/// day-union behavior the bare `*` implies.
#[derive(Debug, Clone)]
pub struct CronExpression {
    source: String,
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    day_of_week: FieldSet,
    dom_is_star: bool,
    dow_is_star: bool,
}

impl CronExpression {
    /// Parse an expression of exactly 5 whitespace-separated fields.
    pub fn parse(input: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = input.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount { found: fields.len() });
        }

        let minute = parse_field(MINUTE, fields[0])?;
        let hour = parse_field(HOUR, fields[1])?;
        let day_of_month = parse_field(DAY_OF_MONTH, fields[2])?;
        let month = parse_field(MONTH, fields[3])?;
        let day_of_week = parse_field(DAY_OF_WEEK, fields[4])?;

        Ok(Self {
            source: fields.join(" "),
            minute: minute.set,
            hour: hour.set,
            day_of_month: day_of_month.set,
            month: month.set,
            day_of_week: day_of_week.set,
            dom_is_star: day_of_month.is_star,
            dow_is_star: day_of_week.is_star,
        })
    }

    /// The normalized source text (fields joined by single spaces).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether a date satisfies the day fields. Day-of-month and day-of-week
    /// union when both are restricted; otherwise they intersect (and a bare
    /// `*` admits everything).
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.day_of_month.contains(date.day());
        let dow = self.day_of_week.contains(date.weekday().num_days_from_sunday());
        if !self.dom_is_star && !self.dow_is_star {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// Whether a civil (timezone-local) minute satisfies the expression.
    pub fn matches_civil(&self, civil: NaiveDateTime) -> bool {
        self.minute.contains(civil.minute())
            && self.hour.contains(civil.hour())
            && self.month.contains(civil.month())
            && self.day_matches(civil.date())
    }

    /// Next firing strictly after `after`, evaluated in `tz`, as a UTC
    /// instant. A reference falling exactly on a minute boundary still
    /// advances; a schedule never fires twice at the same minute unless
    /// explicitly re-armed.
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>, CronError> {
        self.next_after_within(after, tz, Duration::days(DEFAULT_HORIZON_DAYS))
    }

    /// Like [`next_after`](Self::next_after) but bounded by `lookahead`
    /// (itself capped at the 4-year defensive horizon).
    pub fn next_after_within(
        &self,
        after: DateTime<Utc>,
        tz: Tz,
        lookahead: Duration,
    ) -> Result<DateTime<Utc>, CronError> {
        next::next_after(self, after, tz, lookahead)
    }

    /// The next `count` firings after `after` (capped at [`MAX_PREVIEW`]).
    pub fn preview(
        &self,
        after: DateTime<Utc>,
        tz: Tz,
        count: usize,
    ) -> Result<Vec<DateTime<Utc>>, CronError> {
        let count = count.min(MAX_PREVIEW);
        let mut runs = Vec::with_capacity(count);
        let mut cursor = after;
        while runs.len() < count {
            let next = self.next_after(cursor, tz)?;
            cursor = next;
            runs.push(next);
        }
        Ok(runs)
    }

    pub(crate) fn minute_set(&self) -> FieldSet {
        self.minute
    }

    pub(crate) fn hour_set(&self) -> FieldSet {
        self.hour
    }

    pub(crate) fn month_set(&self) -> FieldSet {
        self.month
    }
}

impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.minute == other.minute
            && self.hour == other.hour
            && self.day_of_month == other.day_of_month
            && self.month == other.month
            && self.day_of_week == other.day_of_week
            && self.dom_is_star == other.dom_is_star
            && self.dow_is_star == other.dow_is_star
    }
}

impl Eq for CronExpression {}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for CronExpression {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use chrono_tz::UTC;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn hourly_advances_to_next_hour() {
        let expr = CronExpression::parse("0 * * * *").unwrap();
        let next = expr.next_after(utc(2024, 1, 1, 12, 0), UTC).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 13, 0));
    }

    #[test]
    fn five_minute_step() {
        let expr = CronExpression::parse("*/5 * * * *").unwrap();
        let next = expr.next_after(utc(2024, 1, 1, 12, 0), UTC).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 12, 5));
    }

    #[test]
    fn daily_midnight_rolls_to_next_day() {
        let expr = CronExpression::parse("0 0 * * *").unwrap();
        let next = expr.next_after(utc(2024, 1, 1, 12, 0), UTC).unwrap();
        assert_eq!(next, utc(2024, 1, 2, 0, 0));
    }

    #[test]
    fn exact_minute_reference_does_not_refire() {
        let expr = CronExpression::parse("0 12 * * *").unwrap();
        let next = expr.next_after(utc(2024, 1, 1, 12, 0), UTC).unwrap();
        assert_eq!(next, utc(2024, 1, 2, 12, 0));
    }

    #[test]
    fn mid_minute_reference_rounds_up() {
        let expr = CronExpression::parse("* * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 30).unwrap();
        assert_eq!(expr.next_after(after, UTC).unwrap(), utc(2024, 1, 1, 12, 1));
    }

    #[test]
    fn month_rollover_into_next_year() {
        let expr = CronExpression::parse("0 0 1 jan *").unwrap();
        let next = expr.next_after(utc(2024, 3, 5, 8, 0), UTC).unwrap();
        assert_eq!(next, utc(2025, 1, 1, 0, 0));
    }

    #[test]
    fn dom_dow_union_when_both_restricted() {
        // 2024-06-01 is a Saturday; day 15 is the other arm of the union.
        let expr = CronExpression::parse("0 0 15 * sat").unwrap();
        let next = expr.next_after(utc(2024, 5, 30, 0, 0), UTC).unwrap();
        assert_eq!(next, utc(2024, 6, 1, 0, 0));
        let after_sat = expr.next_after(next, UTC).unwrap();
        assert_eq!(after_sat, utc(2024, 6, 8, 0, 0));
    }

    #[test]
    fn dom_intersects_when_dow_is_star() {
        let expr = CronExpression::parse("0 0 15 * *").unwrap();
        let next = expr.next_after(utc(2024, 6, 1, 0, 0), UTC).unwrap();
        assert_eq!(next, utc(2024, 6, 15, 0, 0));
    }

    #[test]
    fn dow_only_restriction() {
        // 2024-01-01 is a Monday.
        let expr = CronExpression::parse("30 9 * * mon").unwrap();
        let next = expr.next_after(utc(2024, 1, 1, 10, 0), UTC).unwrap();
        assert_eq!(next, utc(2024, 1, 8, 9, 30));
    }

    #[test]
    fn timezone_offset_applies() {
        // 09:00 in New York during June is 13:00 UTC (EDT).
        let expr = CronExpression::parse("0 9 * * *").unwrap();
        let next = expr.next_after(utc(2024, 6, 15, 0, 0), New_York).unwrap();
        assert_eq!(next, utc(2024, 6, 15, 13, 0));
    }

    #[test]
    fn spring_forward_gap_skips_to_next_match() {
        // 02:30 local does not exist on 2024-03-10 in New York; the walk
        // lands on 02:30 EDT the next day (06:30 UTC).
        let expr = CronExpression::parse("30 2 * * *").unwrap();
        let next = expr.next_after(utc(2024, 3, 10, 5, 0), New_York).unwrap();
        assert_eq!(next, utc(2024, 3, 11, 6, 30));
    }

    #[test]
    fn fall_back_overlap_takes_earlier_occurrence() {
        // 01:30 local repeats on 2024-11-03 in New York; the earlier (EDT)
        // occurrence is 05:30 UTC.
        let expr = CronExpression::parse("30 1 * * *").unwrap();
        let next = expr.next_after(utc(2024, 11, 3, 4, 0), New_York).unwrap();
        assert_eq!(next, utc(2024, 11, 3, 5, 30));
    }

    #[test]
    fn unsatisfiable_expression_hits_horizon() {
        let expr = CronExpression::parse("0 0 31 feb *").unwrap();
        let err = expr.next_after(utc(2024, 1, 1, 0, 0), UTC).unwrap_err();
        assert!(matches!(err, CronError::NoFutureFiring { .. }));
    }

    #[test]
    fn bounded_lookahead_reports_no_firing() {
        let expr = CronExpression::parse("0 0 1 jan *").unwrap();
        let err = expr
            .next_after_within(utc(2024, 3, 1, 0, 0), UTC, Duration::days(30))
            .unwrap_err();
        assert!(matches!(err, CronError::NoFutureFiring { .. }));
    }

    #[test]
    fn preview_chains_and_caps() {
        let expr = CronExpression::parse("0 * * * *").unwrap();
        let runs = expr.preview(utc(2024, 1, 1, 0, 30), UTC, 3).unwrap();
        assert_eq!(
            runs,
            vec![utc(2024, 1, 1, 1, 0), utc(2024, 1, 1, 2, 0), utc(2024, 1, 1, 3, 0)]
        );

        let capped = expr.preview(utc(2024, 1, 1, 0, 30), UTC, 50).unwrap();
        assert_eq!(capped.len(), MAX_PREVIEW);
    }

    #[test]
    fn wrong_field_count_rejected() {
        let err = CronExpression::parse("* * * *").unwrap_err();
        assert!(matches!(err, CronError::FieldCount { found: 4 }));
        let err = CronExpression::parse("* * * * * *").unwrap_err();
        assert!(matches!(err, CronError::FieldCount { found: 6 }));
    }

    #[test]
    fn parse_stringify_parse_is_stable() {
        let expr = CronExpression::parse("  */5  9-17   1,15  jan-jun  mon-fri ").unwrap();
        assert_eq!(expr.source(), "*/5 9-17 1,15 jan-jun mon-fri");
        let reparsed = CronExpression::parse(&expr.to_string()).unwrap();
        assert_eq!(reparsed, expr);
    }

    #[test]
    fn matches_civil_agrees_with_next_after() {
        let expr = CronExpression::parse("15 6 * * *").unwrap();
        let next = expr.next_after(utc(2024, 4, 1, 0, 0), UTC).unwrap();
        assert!(expr.matches_civil(next.naive_utc()));
    }
}
