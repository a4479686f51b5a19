use chrono::{DateTime, Utc};

use crate::i18n::t;

/// Coarse age of a timestamp, as shown next to list rows and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAgo {
    JustNow,
    Minutes(i64),
    Hours(i64),
    Days(i64),
    Weeks(i64),
}

pub fn time_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> TimeAgo {
    let secs = (now - ts).num_seconds().max(0);
    match secs {
        s if s < 60 => TimeAgo::JustNow,
        s if s < 60 * 60 => TimeAgo::Minutes(s / 60),
        s if s < 24 * 60 * 60 => TimeAgo::Hours(s / (60 * 60)),
        s if s < 7 * 24 * 60 * 60 => TimeAgo::Days(s / (24 * 60 * 60)),
        s => TimeAgo::Weeks(s / (7 * 24 * 60 * 60)),
    }
}

impl TimeAgo {
    /// Compact label such as `5min` or `3d`.
    pub fn label(&self) -> String {
        match self {
            TimeAgo::JustNow => t("time.now", &[]),
            TimeAgo::Minutes(n) => t("time.minutes", &[("count", n.to_string().as_str())]),
            TimeAgo::Hours(n) => t("time.hours", &[("count", n.to_string().as_str())]),
            TimeAgo::Days(n) => t("time.days", &[("count", n.to_string().as_str())]),
            TimeAgo::Weeks(n) => t("time.weeks", &[("count", n.to_string().as_str())]),
        }
    }
}

pub fn format_time_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    time_ago(ts, now).label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn buckets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(time_ago(now - Duration::seconds(59), now), TimeAgo::JustNow);
        assert_eq!(time_ago(now - Duration::minutes(5), now), TimeAgo::Minutes(5));
        assert_eq!(time_ago(now - Duration::hours(23), now), TimeAgo::Hours(23));
        assert_eq!(time_ago(now - Duration::days(6), now), TimeAgo::Days(6));
        assert_eq!(time_ago(now - Duration::days(15), now), TimeAgo::Weeks(2));
        // clock skew never yields a negative age
        assert_eq!(time_ago(now + Duration::minutes(3), now), TimeAgo::JustNow);
    }

    #[test]
    fn labels_are_compact() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(format_time_ago(now - Duration::minutes(5), now), "5min");
        assert_eq!(format_time_ago(now - Duration::hours(3), now), "3h");
        assert_eq!(format_time_ago(now, now), "agora");
    }
}
