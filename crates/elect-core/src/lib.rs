//! # elect-core
//!
//! Store-mediated leader election for singleton duties.
//!
//! This crate provides the lock catalog, the backing store contract with its
//! PostgreSQL and in-memory implementations, and the [`LeaderElector`] that
//! turns periodic lock polls into leadership transitions.

pub mod leadership;

pub use leadership::{
    AdvisoryLockStore, ElectorConfig, ElectorPhase, ElectorStats, LeaderElectionError,
    LeaderElector, LeadershipEvent, LockId, LockPurpose, LockSession,
};
