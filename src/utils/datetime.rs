use chrono::{DateTime, Utc};

pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%A, %B %d at %I:%M %p").to_string()
}

/// Whole days from `now` until `target`, negative once the target has passed.
pub fn days_until(now: DateTime<Utc>, target: DateTime<Utc>) -> i64 {
    (target - now).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_datetime() {
        let dt = Utc.with_ymd_and_hms(2025, 6, 14, 16, 30, 0).single();
        assert_eq!(
            dt.map(|d| format_datetime(&d)).as_deref(),
            Some("Saturday, June 14 at 04:30 PM")
        );
    }

    #[test]
    fn test_days_until() {
        let now = Utc::now();
        assert_eq!(days_until(now, now + Duration::days(7) + Duration::hours(1)), 7);
        assert_eq!(days_until(now, now - Duration::days(2)), -2);
    }
}
