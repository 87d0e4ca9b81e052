//! Types for leader election.
//!
//! This module defines the data shared between the elector and its host:
//! - `ElectorConfig`: configuration for one elector instance
//! - `ElectorPhase`: where an elector is in its lifecycle
//! - `LeadershipEvent`: the two transitions a host can be notified about
//! - `ElectorStats`: counters for diagnostics

use super::LeaderElectionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between poll attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default bound on a single store operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a leader elector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectorConfig {
    /// Unique identifier for this instance, used in logs only.
    ///
    /// If not specified, defaults to hostname + process ID.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// How often the election loop polls the store.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Upper bound on each acquire or release call against the store.
    #[serde(with = "humantime_serde", default = "default_operation_timeout")]
    pub operation_timeout: Duration,
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_operation_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

impl ElectorConfig {
    /// Creates a new configuration with the specified instance ID.
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Creates a configuration with the default instance ID (hostname + PID).
    pub fn with_default_instance_id() -> Self {
        Self::new(default_instance_id())
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the per-operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), LeaderElectionError> {
        if self.instance_id.trim().is_empty() {
            return Err(LeaderElectionError::invalid_config(
                "instance_id cannot be empty",
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(LeaderElectionError::invalid_config(
                "poll_interval must be greater than zero",
            ));
        }

        if self.operation_timeout.is_zero() {
            return Err(LeaderElectionError::invalid_config(
                "operation_timeout must be greater than zero",
            ));
        }

        // A slower store call would let polls pile up behind each other.
        if self.operation_timeout > self.poll_interval {
            return Err(LeaderElectionError::invalid_config(format!(
                "operation_timeout ({:?}) must not exceed poll_interval ({:?})",
                self.operation_timeout, self.poll_interval
            )));
        }

        Ok(())
    }
}

impl Default for ElectorConfig {
    fn default() -> Self {
        Self::with_default_instance_id()
    }
}

/// Generates the default instance ID from hostname and process ID.
pub fn default_instance_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    let pid = std::process::id();
    format!("{}-{}", hostname, pid)
}

/// Lifecycle phase of a leader elector.
///
/// ```text
///            start()              poll granted
///   Idle ────────────▶ Polling ◀──────────────▶ Leader
///                         │      poll denied       │
///                         │ stop()                 │ stop()
///                         ▼                        ▼
///                      Stopped ◀───────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectorPhase {
    /// Constructed, loop not started.
    #[default]
    Idle,
    /// Loop running, lock not held (or not yet known).
    Polling,
    /// Loop running and the lock is held.
    Leader,
    /// Loop cancelled and the lock released if it was held.
    Stopped,
}

impl ElectorPhase {
    /// Returns `true` once the elector has been stopped.
    pub fn is_terminal(self) -> bool {
        matches!(self, ElectorPhase::Stopped)
    }
}

/// A leadership transition, as delivered by
/// [`LeaderElector::start_with_events`](super::LeaderElector::start_with_events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadershipEvent {
    /// The lock was granted after not being held.
    BecameLeader,
    /// The lock is no longer held after having been held.
    LostLeadership,
}

impl LeadershipEvent {
    /// Computes the edge between two consecutive observations, if any.
    pub fn between(was_leader: bool, is_leader: bool) -> Option<Self> {
        match (was_leader, is_leader) {
            (false, true) => Some(LeadershipEvent::BecameLeader),
            (true, false) => Some(LeadershipEvent::LostLeadership),
            _ => None,
        }
    }

    /// Label used in metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            LeadershipEvent::BecameLeader => "became_leader",
            LeadershipEvent::LostLeadership => "lost_leadership",
        }
    }
}

/// Snapshot of an elector's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectorStats {
    /// Poll attempts made, successful or not.
    pub polls: u64,
    /// Poll attempts that failed with a store error.
    pub poll_errors: u64,
    /// Times leadership was gained.
    pub acquisitions: u64,
    /// Times leadership was lost, not counting [`stop`](crate::leadership::LeaderElector::stop).
    pub losses: u64,
    /// Release calls issued on stop.
    pub releases: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elector_config_new() {
        let config = ElectorConfig::new("my-instance");

        assert_eq!(config.instance_id, "my-instance");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_elector_config_builder() {
        let config = ElectorConfig::new("my-instance")
            .with_poll_interval(Duration::from_secs(10))
            .with_operation_timeout(Duration::from_secs(2));

        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.operation_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_elector_config_validation() {
        assert!(ElectorConfig::new("").validate().is_err());
        assert!(ElectorConfig::new("   ").validate().is_err());

        let zero_interval = ElectorConfig::new("a").with_poll_interval(Duration::ZERO);
        assert!(zero_interval.validate().is_err());

        let zero_timeout = ElectorConfig::new("a").with_operation_timeout(Duration::ZERO);
        assert!(zero_timeout.validate().is_err());

        let slow_store = ElectorConfig::new("a")
            .with_poll_interval(Duration::from_secs(1))
            .with_operation_timeout(Duration::from_secs(2));
        let err = slow_store.validate().unwrap_err();
        assert!(err.to_string().contains("operation_timeout"));
    }

    #[test]
    fn test_elector_config_deserialize_humantime() {
        let yaml = r#"
instance_id: worker-7
poll_interval: 10s
operation_timeout: 1500ms
"#;
        let config: ElectorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.instance_id, "worker-7");
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.operation_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_elector_config_deserialize_defaults() {
        let config: ElectorConfig = serde_yaml::from_str("instance_id: only-id").unwrap();
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.operation_timeout, DEFAULT_OPERATION_TIMEOUT);
    }

    #[test]
    fn test_default_instance_id() {
        let id = default_instance_id();
        assert!(id.contains('-'));
        assert!(id.ends_with(&std::process::id().to_string()));
    }

    #[test]
    fn test_event_edges() {
        assert_eq!(
            LeadershipEvent::between(false, true),
            Some(LeadershipEvent::BecameLeader)
        );
        assert_eq!(
            LeadershipEvent::between(true, false),
            Some(LeadershipEvent::LostLeadership)
        );
        assert_eq!(LeadershipEvent::between(true, true), None);
        assert_eq!(LeadershipEvent::between(false, false), None);
    }

    #[test]
    fn test_phase_default_and_serde() {
        assert_eq!(ElectorPhase::default(), ElectorPhase::Idle);
        assert!(ElectorPhase::Stopped.is_terminal());
        assert!(!ElectorPhase::Leader.is_terminal());
        assert_eq!(
            serde_json::to_string(&ElectorPhase::Polling).unwrap(),
            "\"polling\""
        );
    }
}
