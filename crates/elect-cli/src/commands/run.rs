//! Run command - competes for every configured purpose until interrupted.

use anyhow::{Context, Result};
use colored::Colorize;
use elect_core::leadership::{
    AdvisoryLockStore, ElectorConfig, LeaderElector, LockPurpose, PgAdvisoryLockStore,
};
use elect_observability::election_span;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;

/// Runs one elector per configured purpose until Ctrl+C.
pub async fn run_electors(config: &AppConfig) -> Result<()> {
    println!("{} Starting electors...", "[elector]".cyan());

    println!(
        "  {} Database: {}",
        "→".green(),
        config.redact_secrets().database.url
    );
    let store = PgAdvisoryLockStore::connect(&config.database.url, config.database.pool_options())
        .await
        .context("Failed to connect to the lock database")?;

    elect_observability::register_election_metrics();

    let electors = build_electors(Arc::new(store), &config.purposes, &config.election);
    for elector in &electors {
        start_logged(elector);
        println!(
            "  {} {} (key {})",
            "→".green(),
            elector.lock_id().name(),
            elector.lock_id().key()
        );
    }

    println!();
    println!("  {} {}", "Instance:".cyan(), config.election.instance_id);
    println!(
        "  {} {:?}",
        "Poll interval:".cyan(),
        config.election.poll_interval
    );
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());

    let signal = tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C");

    println!("\n{}", "Shutting down...".yellow());
    stop_all(&electors).await;
    signal?;

    println!("{} All electors stopped", "[elector]".cyan());
    Ok(())
}

/// Builds one idle elector per purpose, all sharing `store`.
pub(crate) fn build_electors(
    store: Arc<dyn AdvisoryLockStore>,
    purposes: &[LockPurpose],
    config: &ElectorConfig,
) -> Vec<LeaderElector> {
    purposes
        .iter()
        .map(|purpose| LeaderElector::new(purpose.lock_id(), Arc::clone(&store), config.clone()))
        .collect()
}

/// Starts an elector whose callbacks only log the transition.
pub(crate) fn start_logged(elector: &LeaderElector) {
    let lock = elector.lock_id();
    let instance_id = elector.config().instance_id.clone();
    let lose_instance_id = instance_id.clone();

    elector.start(
        move || {
            let _span = election_span!(lock.name(), instance_id).entered();
            info!("This instance is now leader");
        },
        move || {
            let _span = election_span!(lock.name(), lose_instance_id).entered();
            warn!("This instance is no longer leader");
        },
    );
}

/// Stops every elector, releasing whatever each one holds.
pub(crate) async fn stop_all(electors: &[LeaderElector]) {
    for elector in electors {
        elector.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elect_core::leadership::{ElectorPhase, MockLockStore};
    use std::time::Duration;

    async fn wait_until_leader(elector: &LeaderElector) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !elector.is_leader() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("elector should become leader");
    }

    #[test]
    fn test_build_electors_one_per_purpose() {
        let store: Arc<dyn AdvisoryLockStore> = Arc::new(MockLockStore::new());
        let config = ElectorConfig::new("host-1");

        let electors = build_electors(store, &LockPurpose::ALL, &config);

        assert_eq!(electors.len(), LockPurpose::ALL.len());
        for (elector, purpose) in electors.iter().zip(LockPurpose::ALL) {
            assert_eq!(elector.lock_id(), purpose.lock_id());
            assert_eq!(elector.config().instance_id, "host-1");
            assert_eq!(elector.phase(), ElectorPhase::Idle);
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_all() {
        let store = MockLockStore::new();
        let electors = build_electors(
            Arc::new(store.clone()),
            &[LockPurpose::JobsScheduler, LockPurpose::Maintenance],
            &ElectorConfig::new("host-1"),
        );

        for elector in &electors {
            start_logged(elector);
        }
        for elector in &electors {
            wait_until_leader(elector).await;
        }

        stop_all(&electors).await;

        assert!(electors.iter().all(|e| e.phase() == ElectorPhase::Stopped));
        assert_eq!(store.holder(LockPurpose::JobsScheduler.lock_id()), None);
        assert_eq!(store.holder(LockPurpose::Maintenance.lock_id()), None);
        assert_eq!(store.open_sessions(), 0);
    }
}
