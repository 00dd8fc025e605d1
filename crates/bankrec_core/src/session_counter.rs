use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct SessionCounter {
    start_time: DateTime<Utc>,
    reconciled_count: u32,
    elapsed_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSummary {
    pub reconciled_count: u32,
    pub elapsed_seconds: i64,
    pub seconds_per_transaction: i64,
    /// `hh:mm:ss`.
    pub formatted_duration: String,
    pub human_duration: String,
}

impl Default for SessionCounter {
    fn default() -> Self {
        Self::started_at(Utc::now())
    }
}

impl SessionCounter {
    pub fn started_at(now: DateTime<Utc>) -> Self {
        Self {
            start_time: now,
            reconciled_count: 0,
            elapsed_seconds: None,
        }
    }

    pub fn init(&mut self) {
        self.init_at(Utc::now());
    }

    pub fn init_at(&mut self, now: DateTime<Utc>) {
        *self = Self::started_at(now);
    }

    pub fn increment(&mut self) {
        self.increment_at(Utc::now());
    }

    pub fn increment_at(&mut self, now: DateTime<Utc>) {
        // Both ends are truncated to whole seconds before differencing.
        self.elapsed_seconds = Some((now.timestamp() - self.start_time.timestamp()).max(0));
        self.reconciled_count += 1;
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn reconciled_count(&self) -> u32 {
        self.reconciled_count
    }

    pub fn elapsed_seconds(&self) -> Option<i64> {
        self.elapsed_seconds
    }

    pub fn should_show_summary(&self) -> bool {
        self.reconciled_count > 0
    }

    /// `None` until at least one line was validated.
    pub fn summary(&self) -> Option<CounterSummary> {
        if self.reconciled_count == 0 {
            return None;
        }
        let elapsed_seconds = self.elapsed_seconds.unwrap_or_default();
        Some(CounterSummary {
            reconciled_count: self.reconciled_count,
            elapsed_seconds,
            seconds_per_transaction: (elapsed_seconds as f64 / f64::from(self.reconciled_count))
                .round() as i64,
            formatted_duration: format_clock(elapsed_seconds),
            human_duration: human_duration(elapsed_seconds),
        })
    }
}

fn format_clock(seconds: i64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60
    )
}

/// Granularity grows with magnitude: seconds, then minutes past 60s, then
/// hours past 3600s. Zero-valued units of the chosen granularity are kept.
pub fn human_duration(seconds: i64) -> String {
    let parts = if seconds > 3600 {
        vec![
            unit(seconds / 3600, "hour"),
            unit(seconds % 3600 / 60, "minute"),
            unit(seconds % 60, "second"),
        ]
    } else if seconds > 60 {
        vec![unit(seconds / 60, "minute"), unit(seconds % 60, "second")]
    } else {
        vec![unit(seconds, "second")]
    };
    parts.join(", ")
}

fn unit(value: i64, name: &str) -> String {
    if value == 1 {
        format!("{value} {name}")
    } else {
        format!("{value} {name}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(seconds: i64, millis: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().expect("timestamp")
            + Duration::seconds(seconds)
            + Duration::milliseconds(millis)
    }

    #[test]
    fn summary_is_withheld_before_any_validation() {
        let counter = SessionCounter::started_at(at(0, 0));
        assert!(!counter.should_show_summary());
        assert_eq!(counter.summary(), None);
    }

    #[test]
    fn sixty_five_seconds_promote_to_minutes() {
        let mut counter = SessionCounter::started_at(at(0, 0));
        counter.increment_at(at(65, 0));

        let summary = counter.summary().expect("summary");
        assert_eq!(summary.elapsed_seconds, 65);
        assert_eq!(summary.reconciled_count, 1);
        assert_eq!(summary.seconds_per_transaction, 65);
        assert_eq!(summary.human_duration, "1 minute, 5 seconds");
        assert_eq!(summary.formatted_duration, "00:01:05");
    }

    #[test]
    fn milliseconds_are_dropped_on_both_ends() {
        let mut counter = SessionCounter::started_at(at(0, 900));
        counter.increment_at(at(10, 100));
        assert_eq!(counter.elapsed_seconds(), Some(10));
    }

    #[test]
    fn rate_is_rounded_per_transaction() {
        let mut counter = SessionCounter::started_at(at(0, 0));
        counter.increment_at(at(3, 0));
        counter.increment_at(at(5, 0));

        let summary = counter.summary().expect("summary");
        assert_eq!(summary.reconciled_count, 2);
        assert_eq!(summary.seconds_per_transaction, 3);
        assert_eq!(summary.human_duration, "5 seconds");
    }

    #[test]
    fn init_starts_a_fresh_sitting() {
        let mut counter = SessionCounter::started_at(at(0, 0));
        counter.increment_at(at(30, 0));
        counter.init_at(at(40, 0));
        assert_eq!(counter.reconciled_count(), 0);
        assert_eq!(counter.elapsed_seconds(), None);
        assert_eq!(counter.start_time(), at(40, 0));
    }

    #[test]
    fn human_duration_buckets() {
        assert_eq!(human_duration(1), "1 second");
        assert_eq!(human_duration(60), "60 seconds");
        assert_eq!(human_duration(120), "2 minutes, 0 seconds");
        assert_eq!(human_duration(3600), "60 minutes, 0 seconds");
        assert_eq!(human_duration(3661), "1 hour, 1 minute, 1 second");
        assert_eq!(human_duration(7322), "2 hours, 2 minutes, 2 seconds");
    }
}
