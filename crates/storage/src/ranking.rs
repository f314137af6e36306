//! Candidate ordering shared by the stores.
//!
//! Lower `nice` runs first:
//!
//! | class | condition                                             | nice                    |
//! |-------|-------------------------------------------------------|-------------------------|
//! | 0     | never attempted                                       | `0`                     |
//! | 1     | last attempt failed, backoff `min(2^failed, 60)` days elapsed | `1 + e^(-hours since)` |
//! | 2     | last attempt older than 30 days                       | `2 + e^(-days since)`   |
//!
//! A link matching both class 1 and class 2 takes the lower value.

use chrono::{DateTime, Duration, Utc};
use harvest_core::CloneRecord;

pub const STALE_AFTER_DAYS: i64 = 30;
pub const MAX_BACKOFF_DAYS: i64 = 60;

/// Wait before retrying a link that failed `failed_times` times in a row.
pub fn backoff(failed_times: i32) -> Duration {
    let exp = failed_times.clamp(0, 6) as u32;
    Duration::days((1i64 << exp).min(MAX_BACKOFF_DAYS))
}

/// Rank for `record` at `now`, or `None` when the link is not due.
pub fn nice(record: Option<&CloneRecord>, now: DateTime<Utc>) -> Option<f64> {
    let Some(updated) = record.and_then(|r| r.update_time) else {
        return Some(0.0);
    };
    let record = record?;
    let age = now - updated;
    let hours = age.num_seconds() as f64 / 3600.0;

    let retry =
        (!record.success && age > backoff(record.failed_times)).then(|| 1.0 + (-hours).exp());
    let stale = (age > Duration::days(STALE_AFTER_DAYS)).then(|| 2.0 + (-hours / 24.0).exp());

    match (retry, stale) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(success: bool, failed_times: i32, days_ago: i64, now: DateTime<Utc>) -> CloneRecord {
        CloneRecord {
            link: "https://example.com/a/b".into(),
            file_path: Some("example.com/1/a/a/b".into()),
            success,
            message: None,
            update_time: Some(now - Duration::days(days_ago)),
            failed_times,
            last_success: None,
            take_time_ms: Some(1),
            take_storage: None,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(0), Duration::days(1));
        assert_eq!(backoff(1), Duration::days(2));
        assert_eq!(backoff(3), Duration::days(8));
        assert_eq!(backoff(5), Duration::days(32));
        assert_eq!(backoff(6), Duration::days(60));
        assert_eq!(backoff(40), Duration::days(60));
    }

    #[test]
    fn classes_are_ordered() {
        let now = Utc::now();
        assert_eq!(nice(None, now), Some(0.0));

        let failed = nice(Some(&record(false, 1, 3, now)), now).unwrap();
        assert!(failed > 1.0 && failed < 2.0);

        let stale = nice(Some(&record(true, 0, 45, now)), now).unwrap();
        assert!(stale > 2.0 && stale < 3.0);
    }

    #[test]
    fn links_inside_their_window_are_not_due() {
        let now = Utc::now();
        assert_eq!(nice(Some(&record(false, 3, 5, now)), now), None);
        assert_eq!(nice(Some(&record(true, 0, 10, now)), now), None);
    }

    #[test]
    fn old_failure_prefers_retry_class() {
        let now = Utc::now();
        let n = nice(Some(&record(false, 1, 40, now)), now).unwrap();
        assert!(n < 2.0);
    }
}
