//! Registry of advisory lock identifiers.
//!
//! Every singleton duty in the fleet gets one entry in [`LockPurpose`], and
//! every entry maps to a fixed 64-bit key in the shared lock namespace. The
//! keys are part of the deployment contract: changing one while old
//! instances are still running splits leadership for that purpose.

use super::LeaderElectionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key plus human-readable name of one lock in the store's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockId {
    key: i64,
    name: &'static str,
}

impl LockId {
    /// Creates a lock identifier.
    ///
    /// Prefer [`LockPurpose::lock_id`]; this exists for tests and for hosts
    /// that keep their own catalog.
    pub const fn new(key: i64, name: &'static str) -> Self {
        Self { key, name }
    }

    /// The integer key passed to the backing store.
    pub const fn key(&self) -> i64 {
        self.key
    }

    /// The name used in logs and metrics labels.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.key)
    }
}

/// The singleton duties that are coordinated through leader election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockPurpose {
    /// Runs scheduled jobs.
    JobsScheduler,
    /// Runs scheduled function invocations.
    FunctionsScheduler,
    /// Dispatches scheduled RPC calls.
    RpcScheduler,
    /// Periodic housekeeping (expired sessions, stale rows).
    Maintenance,
}

impl LockPurpose {
    /// Every purpose in the catalog.
    pub const ALL: [LockPurpose; 4] = [
        LockPurpose::JobsScheduler,
        LockPurpose::FunctionsScheduler,
        LockPurpose::RpcScheduler,
        LockPurpose::Maintenance,
    ];

    /// Stable kebab-case name.
    pub const fn name(self) -> &'static str {
        match self {
            LockPurpose::JobsScheduler => "jobs-scheduler",
            LockPurpose::FunctionsScheduler => "functions-scheduler",
            LockPurpose::RpcScheduler => "rpc-scheduler",
            LockPurpose::Maintenance => "maintenance",
        }
    }

    /// The lock identifier reserved for this purpose.
    pub const fn lock_id(self) -> LockId {
        match self {
            LockPurpose::JobsScheduler => LockId::new(7_241_001, self.name()),
            LockPurpose::FunctionsScheduler => LockId::new(7_241_002, self.name()),
            LockPurpose::RpcScheduler => LockId::new(7_241_003, self.name()),
            LockPurpose::Maintenance => LockId::new(7_241_004, self.name()),
        }
    }
}

impl fmt::Display for LockPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LockPurpose {
    type Err = LeaderElectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        LockPurpose::ALL
            .into_iter()
            .find(|purpose| purpose.name() == wanted)
            .ok_or_else(|| LeaderElectionError::unknown_purpose(s))
    }
}

impl From<LockPurpose> for LockId {
    fn from(purpose: LockPurpose) -> Self {
        purpose.lock_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique() {
        let keys: HashSet<i64> = LockPurpose::ALL.iter().map(|p| p.lock_id().key()).collect();
        assert_eq!(keys.len(), LockPurpose::ALL.len());
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<&str> = LockPurpose::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names.len(), LockPurpose::ALL.len());
    }

    #[test]
    fn test_lock_id_is_stable() {
        assert_eq!(LockPurpose::JobsScheduler.lock_id(), LockPurpose::JobsScheduler.lock_id());
        assert_eq!(LockPurpose::JobsScheduler.lock_id().key(), 7_241_001);
        assert_eq!(LockPurpose::JobsScheduler.lock_id().name(), "jobs-scheduler");
    }

    #[test]
    fn test_parse_purpose() {
        assert_eq!(
            "rpc-scheduler".parse::<LockPurpose>().unwrap(),
            LockPurpose::RpcScheduler
        );
        assert_eq!(
            "Functions_Scheduler".parse::<LockPurpose>().unwrap(),
            LockPurpose::FunctionsScheduler
        );

        let err = "billing".parse::<LockPurpose>().unwrap_err();
        assert!(err.to_string().contains("billing"));
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&LockPurpose::JobsScheduler).unwrap();
        assert_eq!(json, "\"jobs-scheduler\"");

        let parsed: LockPurpose = serde_json::from_str("\"maintenance\"").unwrap();
        assert_eq!(parsed, LockPurpose::Maintenance);
    }

    #[test]
    fn test_serde_name_matches_name() {
        for purpose in LockPurpose::ALL {
            let json = serde_json::to_string(&purpose).unwrap();
            assert_eq!(json, format!("\"{}\"", purpose.name()));
        }
    }

    #[test]
    fn test_display() {
        let id = LockId::new(42, "test-lock");
        assert_eq!(id.to_string(), "test-lock (42)");
        assert_eq!(LockPurpose::Maintenance.to_string(), "maintenance");
    }
}
