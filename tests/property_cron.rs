//! Property tests for the cron engine.
//!
//! The central property: for any expression and reference instant, the
//! computed next firing satisfies the expression, lies strictly after the
//! reference, and no minute strictly between the two satisfies it.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use chrono_tz::UTC;
use metronome::cron::CronExpression;
use proptest::prelude::*;

fn minute_field() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("*".to_string()),
        (0u32..60).prop_map(|v| v.to_string()),
        (1u32..=30).prop_map(|step| format!("*/{step}")),
        (0u32..50, 1u32..10).prop_map(|(lo, span)| format!("{}-{}", lo, lo + span)),
        (0u32..60, 0u32..60).prop_map(|(a, b)| {
            let (a, b) = (a.min(b), a.max(b));
            if a == b {
                a.to_string()
            } else {
                format!("{a},{b}")
            }
        }),
    ]
}

fn hour_field() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("*".to_string()),
        (0u32..24).prop_map(|v| v.to_string()),
        (1u32..=12).prop_map(|step| format!("*/{step}")),
        (0u32..20, 1u32..4).prop_map(|(lo, span)| format!("{}-{}", lo, lo + span)),
    ]
}

fn expression() -> impl Strategy<Value = String> {
    // Day/month/weekday stay unrestricted so the firing gap is bounded by
    // ~25 hours and the brute-force minimality check stays cheap.
    (minute_field(), hour_field()).prop_map(|(m, h)| format!("{m} {h} * * *"))
}

fn reference_instant() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..730, 0i64..1440, 0i64..60).prop_map(|(days, minutes, seconds)| {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + Duration::days(days)
            + Duration::minutes(minutes)
            + Duration::seconds(seconds)
    })
}

proptest! {
    #[test]
    fn next_firing_satisfies_and_is_minimal(
        expr_text in expression(),
        reference in reference_instant(),
    ) {
        let expr = CronExpression::parse(&expr_text).unwrap();
        let next = expr.next_after(reference, UTC).unwrap();

        prop_assert!(next > reference);
        prop_assert_eq!(next.second(), 0);
        prop_assert!(expr.matches_civil(next.naive_utc()));

        // No matching minute strictly between the reference and the result.
        let mut probe = (reference + Duration::seconds(60 - i64::from(reference.second())))
            .with_nanosecond(0)
            .unwrap();
        if probe <= reference {
            probe += Duration::minutes(1);
        }
        while probe < next {
            prop_assert!(
                !expr.matches_civil(probe.naive_utc()),
                "minute {} between {} and {} also matches '{}'",
                probe, reference, next, expr_text
            );
            probe += Duration::minutes(1);
        }
    }

    #[test]
    fn parse_stringify_parse_preserves_value_sets(expr_text in expression()) {
        let parsed = CronExpression::parse(&expr_text).unwrap();
        let reparsed = CronExpression::parse(&parsed.to_string()).unwrap();
        prop_assert_eq!(parsed, reparsed);
    }

    #[test]
    fn preview_is_strictly_increasing(
        expr_text in expression(),
        reference in reference_instant(),
    ) {
        let expr = CronExpression::parse(&expr_text).unwrap();
        let runs = expr.preview(reference, UTC, 5).unwrap();
        prop_assert_eq!(runs.len(), 5);
        for pair in runs.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        for run in &runs {
            prop_assert!(expr.matches_civil(run.naive_utc()));
        }
    }
}
