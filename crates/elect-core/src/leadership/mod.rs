//! Leader election for singleton duties shared by a fleet of instances.
//!
//! In a horizontally scaled deployment every instance runs the same code,
//! but some duties (schedulers, maintenance sweeps) must run in exactly one
//! place at a time. Each such duty is a [`LockPurpose`], and each process runs
//! one [`LeaderElector`] per purpose.
//!
//! # Overview
//!
//! Election is mediated by the database's session-scoped advisory locks:
//!
//! 1. The elector opens one **session** on the [`AdvisoryLockStore`] and keeps it
//! 2. Every poll interval it makes a non-blocking **try-lock** on that session
//! 3. A granted try-lock means this instance is the **leader**
//! 4. If the session dies the store releases the lock and another instance
//!    takes it on its next poll
//!
//! There is no lease or TTL: the lock lives exactly as long as the session.
//! Failover after a crash therefore takes about one poll interval plus the
//! time the store needs to notice the dead connection.
//!
//! # Failure Handling
//!
//! A poll that fails with a query error leaves the leadership flag as it
//! was and fires no callbacks, so a transient blip does not cause
//! leadership to flap.
//!
//! Connection errors and timeouts are different: the elector drops its
//! session, and the store drops the lock along with it. If the elector was
//! leader it steps down on that same poll and fires `on_lose_leadership`,
//! so it never claims a lock a rival may already hold. Callers should still
//! re-check [`LeaderElector::is_leader`] during long leader-only work.
//!
//! # Example
//!
//! ```rust,no_run
//! use elect_core::leadership::{ElectorConfig, LeaderElector, LockPurpose, MockLockStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MockLockStore::new());
//!     let elector = LeaderElector::new(
//!         LockPurpose::Maintenance.lock_id(),
//!         store,
//!         ElectorConfig::with_default_instance_id(),
//!     );
//!
//!     let mut events = elector.start_with_events();
//!     while let Some(event) = events.recv().await {
//!         println!("leadership changed: {}", event.as_str());
//!         # break;
//!     }
//!
//!     elector.stop().await;
//! }
//! ```
//!
//! # Implementations
//!
//! - [`MockLockStore`]: In-memory store for testing
//! - `PgAdvisoryLockStore`: PostgreSQL store (requires the `database` feature)

mod elector;
mod error;
mod lock_id;
mod mock;
#[cfg(feature = "database")]
mod postgres;
mod store;
mod types;

pub use elector::LeaderElector;
pub use error::LeaderElectionError;
pub use lock_id::{LockId, LockPurpose};
pub use mock::{LockCall, MockLockSession, MockLockStore, SessionId};
#[cfg(feature = "database")]
pub use postgres::{PgAdvisoryLockStore, PgLockSession, PoolOptions};
pub use store::{AdvisoryLockStore, LockSession};
pub use types::{
    default_instance_id, ElectorConfig, ElectorPhase, ElectorStats, LeadershipEvent,
    DEFAULT_OPERATION_TIMEOUT, DEFAULT_POLL_INTERVAL,
};
