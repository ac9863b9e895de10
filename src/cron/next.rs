//! Next-firing computation: a civil-time field walk with DST resolution.
//!
//! The walk advances month, then day, then hour, then minute, always taking
//! the least admitted value >= the current one and resetting the finer
//! fields on every carry. The selected civil time is resolved through the
//! zone's transition table last, so gap and overlap handling apply to
//! exactly the minute the expression selected.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use super::{CronError, CronExpression, DEFAULT_HORIZON_DAYS};

fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(hour * 60 + minute))
}

fn month_start(year: i32, month: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.and_time(NaiveTime::MIN))
}

fn next_day(cur: NaiveDateTime) -> Option<NaiveDateTime> {
    cur.date().succ_opt().map(|d| d.and_time(NaiveTime::MIN))
}

pub(super) fn next_after(
    expr: &CronExpression,
    after: DateTime<Utc>,
    tz: Tz,
    lookahead: Duration,
) -> Result<DateTime<Utc>, CronError> {
    let overrun = || CronError::NoFutureFiring {
        expression: expr.source().to_string(),
    };

    let local = after.with_timezone(&tz).naive_local();
    // Ceiling to the next minute boundary. A reference exactly on a minute
    // still advances by one.
    let mut cur = at(local.date(), local.hour(), local.minute()) + Duration::minutes(1);
    let horizon = local + lookahead.min(Duration::days(DEFAULT_HORIZON_DAYS));

    'walk: loop {
        if cur > horizon {
            return Err(overrun());
        }

        // Month.
        match expr.month_set().next_at_or_after(cur.month()) {
            Some(m) if m == cur.month() => {}
            Some(m) => {
                cur = month_start(cur.year(), m).ok_or_else(overrun)?;
                continue 'walk;
            }
            None => {
                cur = month_start(cur.year() + 1, expr.month_set().first()).ok_or_else(overrun)?;
                continue 'walk;
            }
        }

        // Day (day-of-month / day-of-week union lives in `day_matches`).
        if !expr.day_matches(cur.date()) {
            cur = next_day(cur).ok_or_else(overrun)?;
            continue 'walk;
        }

        // Hour; a carry resets to the next day at midnight.
        match expr.hour_set().next_at_or_after(cur.hour()) {
            Some(h) if h == cur.hour() => {}
            Some(h) => cur = at(cur.date(), h, 0),
            None => {
                cur = next_day(cur).ok_or_else(overrun)?;
                continue 'walk;
            }
        }

        // Minute; a carry moves to the top of the next hour.
        match expr.minute_set().next_at_or_after(cur.minute()) {
            Some(m) => cur = at(cur.date(), cur.hour(), m),
            None => {
                cur = at(cur.date(), cur.hour(), 0) + Duration::hours(1);
                continue 'walk;
            }
        }

        // Civil time selected; resolve it to an absolute instant.
        match tz.from_local_datetime(&cur) {
            LocalResult::Single(instant) => return Ok(instant.with_timezone(&Utc)),
            // Fall-back overlap: the earlier occurrence.
            LocalResult::Ambiguous(earlier, _) => return Ok(earlier.with_timezone(&Utc)),
            // Spring-forward gap: this local minute does not exist.
            LocalResult::None => {
                cur += Duration::minutes(1);
                continue 'walk;
            }
        }
    }
}
