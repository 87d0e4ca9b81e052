//! Metric descriptions for leader election.
//!
//! Electors record through the `metrics` facade directly; this module only
//! describes the series so an installed exporter can publish help text.
//! Every series carries a `lock` label with the lock's name.

use metrics::{describe_counter, describe_gauge};

/// Poll attempts, successful or not.
pub const POLLS_TOTAL: &str = "election_polls_total";
/// Poll attempts that failed with a store error.
pub const POLL_ERRORS_TOTAL: &str = "election_poll_errors_total";
/// Leadership transitions, labelled by `direction`.
pub const TRANSITIONS_TOTAL: &str = "election_transitions_total";
/// Release calls issued while stopping.
pub const RELEASES_TOTAL: &str = "election_releases_total";
/// 1 while this instance leads the lock, 0 otherwise.
pub const IS_LEADER: &str = "election_is_leader";

/// Registers metric descriptions for every election series.
pub fn register_election_metrics() {
    describe_counter!(POLLS_TOTAL, "Total number of leadership polls");
    describe_counter!(
        POLL_ERRORS_TOTAL,
        "Total number of leadership polls that failed"
    );
    describe_counter!(
        TRANSITIONS_TOTAL,
        "Total number of leadership transitions by direction"
    );
    describe_counter!(
        RELEASES_TOTAL,
        "Total number of lock releases issued on shutdown"
    );
    describe_gauge!(
        IS_LEADER,
        "Whether this instance currently holds the lock (1) or not (0)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{
        Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct DescribingRecorder {
        described: Mutex<Vec<String>>,
    }

    impl DescribingRecorder {
        fn push(&self, key: KeyName) {
            self.described.lock().unwrap().push(key.as_str().to_string());
        }
    }

    impl Recorder for DescribingRecorder {
        fn describe_counter(&self, key: KeyName, _: Option<Unit>, _: SharedString) {
            self.push(key);
        }

        fn describe_gauge(&self, key: KeyName, _: Option<Unit>, _: SharedString) {
            self.push(key);
        }

        fn describe_histogram(&self, key: KeyName, _: Option<Unit>, _: SharedString) {
            self.push(key);
        }

        fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
            Counter::noop()
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_register_describes_every_series() {
        let recorder = DescribingRecorder::default();
        metrics::with_local_recorder(&recorder, register_election_metrics);

        let described = recorder.described.lock().unwrap();
        for name in [
            POLLS_TOTAL,
            POLL_ERRORS_TOTAL,
            TRANSITIONS_TOTAL,
            RELEASES_TOTAL,
            IS_LEADER,
        ] {
            assert!(described.iter().any(|d| d == name), "{} not described", name);
        }
    }

    #[test]
    fn test_series_names_are_prefixed() {
        for name in [
            POLLS_TOTAL,
            POLL_ERRORS_TOTAL,
            TRANSITIONS_TOTAL,
            RELEASES_TOTAL,
            IS_LEADER,
        ] {
            assert!(name.starts_with("election_"));
        }
    }
}
