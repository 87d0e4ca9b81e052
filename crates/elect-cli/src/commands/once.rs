//! Once command - a single acquisition attempt.

use anyhow::{Context, Result};
use elect_core::leadership::{AdvisoryLockStore, ElectorConfig, LeaderElector, LockPurpose};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of a one-shot poll.
#[derive(Debug, Clone, Serialize)]
pub struct OnceOutcome {
    /// The purpose that was polled.
    pub purpose: LockPurpose,
    /// Its lock key.
    pub lock_key: i64,
    /// The instance that polled.
    pub instance_id: String,
    /// Whether the lock was granted.
    pub granted: bool,
}

/// Polls the lock for `purpose` once, then gives it back.
///
/// The elector is always stopped before returning, so a granted lock is
/// released again.
pub async fn try_once(
    store: Arc<dyn AdvisoryLockStore>,
    purpose: LockPurpose,
    config: &ElectorConfig,
) -> Result<OnceOutcome> {
    let elector = LeaderElector::new(purpose.lock_id(), store, config.clone());

    let result = elector.try_acquire_once().await;
    elector.stop().await;

    let granted =
        result.with_context(|| format!("Failed to poll the lock for '{}'", purpose.name()))?;

    Ok(OnceOutcome {
        purpose,
        lock_key: purpose.lock_id().key(),
        instance_id: config.instance_id.clone(),
        granted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use elect_core::leadership::{LockSession, MockLockStore};

    #[tokio::test]
    async fn test_granted_then_released() {
        let store = MockLockStore::new();
        let config = ElectorConfig::new("host-1");

        let outcome = try_once(Arc::new(store.clone()), LockPurpose::RpcScheduler, &config)
            .await
            .unwrap();

        assert!(outcome.granted);
        assert_eq!(outcome.lock_key, LockPurpose::RpcScheduler.lock_id().key());
        assert_eq!(outcome.instance_id, "host-1");
        assert_eq!(store.release_count(LockPurpose::RpcScheduler.lock_id()), 1);
        assert_eq!(store.holder(LockPurpose::RpcScheduler.lock_id()), None);
    }

    #[tokio::test]
    async fn test_denied_while_held_elsewhere() {
        let store = MockLockStore::new();
        let lock = LockPurpose::Maintenance.lock_id();
        let mut other = store.open_session().await.unwrap();
        assert!(other.try_lock(lock).await.unwrap());

        let outcome = try_once(
            Arc::new(store.clone()),
            LockPurpose::Maintenance,
            &ElectorConfig::new("host-2"),
        )
        .await
        .unwrap();

        assert!(!outcome.granted);
        assert_eq!(store.release_count(lock), 0);
        assert_eq!(store.holder(lock), Some(1));
    }

    #[tokio::test]
    async fn test_store_error_is_reported() {
        let store = MockLockStore::new();
        store.fail_next_sessions(1);

        let err = try_once(
            Arc::new(store.clone()),
            LockPurpose::JobsScheduler,
            &ElectorConfig::new("host-1"),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("jobs-scheduler"));
    }

    #[test]
    fn test_outcome_serializes_purpose_name() {
        let outcome = OnceOutcome {
            purpose: LockPurpose::FunctionsScheduler,
            lock_key: 1,
            instance_id: "host-1".to_string(),
            granted: true,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["purpose"], "functions-scheduler");
        assert_eq!(json["granted"], true);
    }
}
