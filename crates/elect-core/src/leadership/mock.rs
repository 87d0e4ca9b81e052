//! In-memory implementation of the lock store for testing.
//!
//! `MockLockStore` behaves like a database with session-scoped advisory
//! locks: every clone shares one lock table, every opened session gets its
//! own identity, and a lock can only be released by the session that holds
//! it. It also records every call and can inject failures, so tests can
//! assert on exactly what an elector asked the store to do.

use super::{AdvisoryLockStore, LeaderElectionError, LockId, LockSession};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Identity of a session opened on a [`MockLockStore`].
pub type SessionId = u64;

/// One recorded lock call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockCall {
    /// The lock key that was requested.
    pub key: i64,
    /// The session that issued the call.
    pub session: SessionId,
    /// The outcome, or `None` if the call failed.
    pub outcome: Option<bool>,
}

#[derive(Debug, Default)]
struct MockState {
    next_session: SessionId,
    sessions_opened: u64,
    open_sessions: HashSet<SessionId>,
    killed_sessions: HashSet<SessionId>,
    holders: HashMap<i64, SessionId>,
    acquires: Vec<LockCall>,
    releases: Vec<LockCall>,
    failing_opens: u32,
    failing_acquires: Vec<LeaderElectionError>,
    failing_releases: Option<LeaderElectionError>,
    acquire_delay: Option<Duration>,
}

impl MockState {
    fn release_all(&mut self, session: SessionId) {
        self.holders.retain(|_, holder| *holder != session);
        self.open_sessions.remove(&session);
    }
}

/// A mock implementation of [`AdvisoryLockStore`] for testing.
///
/// Clones share state, so handing one clone to each elector simulates
/// several processes contending through the same database.
///
/// # Example
///
/// ```rust
/// use elect_core::leadership::{AdvisoryLockStore, LockId, LockSession, MockLockStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockLockStore::new();
/// let id = LockId::new(42, "example");
///
/// let mut first = store.open_session().await?;
/// let mut second = store.open_session().await?;
///
/// assert!(first.try_lock(id).await?);
/// assert!(!second.try_lock(id).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockLockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockLockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock_state(&self.state)
    }

    /// Makes the next `count` calls to `open_session` fail with a connection error.
    pub fn fail_next_sessions(&self, count: u32) {
        self.state().failing_opens = count;
    }

    /// Makes the next `count` calls to `try_lock` fail with a query error.
    ///
    /// Query errors leave the session usable.
    pub fn fail_next_acquires(&self, count: u32) {
        for _ in 0..count {
            self.fail_next_acquire_with(LeaderElectionError::query("injected acquire failure"));
        }
    }

    /// Queues a specific error for an upcoming `try_lock` call.
    pub fn fail_next_acquire_with(&self, error: LeaderElectionError) {
        self.state().failing_acquires.push(error);
    }

    /// Makes every `unlock` call fail with the given error until cleared with `None`.
    pub fn fail_releases(&self, error: Option<LeaderElectionError>) {
        self.state().failing_releases = error;
    }

    /// Delays every `try_lock` call by `delay`.
    pub fn set_acquire_delay(&self, delay: Option<Duration>) {
        self.state().acquire_delay = delay;
    }

    /// Simulates the server terminating a session's connection.
    ///
    /// The session's locks are released and further calls on it fail with a
    /// connection error.
    pub fn kill_session(&self, session: SessionId) {
        let mut state = self.state();
        state.release_all(session);
        state.killed_sessions.insert(session);
    }

    /// Returns the session currently holding `id`, if any.
    pub fn holder(&self, id: LockId) -> Option<SessionId> {
        self.state().holders.get(&id.key()).copied()
    }

    /// Total number of sessions ever opened.
    pub fn sessions_opened(&self) -> u64 {
        self.state().sessions_opened
    }

    /// Number of sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.state().open_sessions.len()
    }

    /// Every `try_lock` call made so far, in order.
    pub fn acquires(&self) -> Vec<LockCall> {
        self.state().acquires.clone()
    }

    /// Number of `try_lock` calls made for `id`.
    pub fn acquire_count(&self, id: LockId) -> usize {
        self.state()
            .acquires
            .iter()
            .filter(|call| call.key == id.key())
            .count()
    }

    /// Every `unlock` call made so far, in order.
    pub fn releases(&self) -> Vec<LockCall> {
        self.state().releases.clone()
    }

    /// Number of `unlock` calls made for `id`.
    pub fn release_count(&self, id: LockId) -> usize {
        self.state()
            .releases
            .iter()
            .filter(|call| call.key == id.key())
            .count()
    }
}

fn lock_state(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl AdvisoryLockStore for MockLockStore {
    async fn open_session(&self) -> Result<Box<dyn LockSession>, LeaderElectionError> {
        let mut state = self.state();

        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(LeaderElectionError::connection("injected session failure"));
        }

        state.next_session += 1;
        state.sessions_opened += 1;
        let id = state.next_session;
        state.open_sessions.insert(id);

        Ok(Box::new(MockLockSession {
            id,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

/// A session handed out by [`MockLockStore`].
#[derive(Debug)]
pub struct MockLockSession {
    id: SessionId,
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

impl MockLockSession {
    /// This session's identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    fn check_usable(&self, state: &MockState) -> Result<(), LeaderElectionError> {
        if self.closed {
            return Err(LeaderElectionError::SessionClosed);
        }
        if state.killed_sessions.contains(&self.id) {
            return Err(LeaderElectionError::connection(format!(
                "session {} was terminated",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LockSession for MockLockSession {
    async fn try_lock(&mut self, id: LockId) -> Result<bool, LeaderElectionError> {
        let delay = lock_state(&self.state).acquire_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock_state(&self.state);
        self.check_usable(&state)?;

        if !state.failing_acquires.is_empty() {
            let error = state.failing_acquires.remove(0);
            state.acquires.push(LockCall {
                key: id.key(),
                session: self.id,
                outcome: None,
            });
            return Err(error);
        }

        let granted = match state.holders.get(&id.key()) {
            None => {
                state.holders.insert(id.key(), self.id);
                true
            }
            Some(holder) => *holder == self.id,
        };

        state.acquires.push(LockCall {
            key: id.key(),
            session: self.id,
            outcome: Some(granted),
        });

        Ok(granted)
    }

    async fn unlock(&mut self, id: LockId) -> Result<bool, LeaderElectionError> {
        let mut state = lock_state(&self.state);
        self.check_usable(&state)?;

        if let Some(error) = state.failing_releases.clone() {
            state.releases.push(LockCall {
                key: id.key(),
                session: self.id,
                outcome: None,
            });
            return Err(error);
        }

        let released = state.holders.get(&id.key()) == Some(&self.id);
        if released {
            state.holders.remove(&id.key());
        }

        state.releases.push(LockCall {
            key: id.key(),
            session: self.id,
            outcome: Some(released),
        });

        Ok(released)
    }

    async fn close(mut self: Box<Self>) -> Result<(), LeaderElectionError> {
        self.closed = true;
        lock_state(&self.state).release_all(self.id);
        Ok(())
    }
}

impl Drop for MockLockSession {
    fn drop(&mut self) {
        // Same as a dropped database connection: the store frees its locks.
        if !self.closed {
            lock_state(&self.state).release_all(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK: LockId = LockId::new(42, "test-lock");

    #[tokio::test]
    async fn test_exclusive_between_sessions() {
        let store = MockLockStore::new();
        let mut a = store.open_session().await.unwrap();
        let mut b = store.open_session().await.unwrap();

        assert!(a.try_lock(LOCK).await.unwrap());
        assert!(!b.try_lock(LOCK).await.unwrap());
        assert_eq!(store.holder(LOCK), Some(1));
        assert_eq!(store.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn test_relock_by_holder_does_not_stack() {
        let store = MockLockStore::new();
        let mut a = store.open_session().await.unwrap();
        let mut b = store.open_session().await.unwrap();

        assert!(a.try_lock(LOCK).await.unwrap());
        assert!(a.try_lock(LOCK).await.unwrap());
        assert!(a.try_lock(LOCK).await.unwrap());

        // One unlock frees it no matter how often it was re-requested.
        assert!(a.unlock(LOCK).await.unwrap());
        assert!(b.try_lock(LOCK).await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_session_cannot_release() {
        let store = MockLockStore::new();
        let mut holder = store.open_session().await.unwrap();
        let mut intruder = store.open_session().await.unwrap();

        assert!(holder.try_lock(LOCK).await.unwrap());
        assert!(!intruder.unlock(LOCK).await.unwrap());
        assert_eq!(store.holder(LOCK), Some(1));
    }

    #[tokio::test]
    async fn test_unlock_when_not_held_is_not_an_error() {
        let store = MockLockStore::new();
        let mut session = store.open_session().await.unwrap();
        assert!(!session.unlock(LOCK).await.unwrap());
    }

    #[tokio::test]
    async fn test_close_releases_locks() {
        let store = MockLockStore::new();
        let mut a = store.open_session().await.unwrap();
        let mut b = store.open_session().await.unwrap();

        assert!(a.try_lock(LOCK).await.unwrap());
        a.close().await.unwrap();

        assert_eq!(store.holder(LOCK), None);
        assert_eq!(store.open_sessions(), 1);
        assert!(b.try_lock(LOCK).await.unwrap());
    }

    #[tokio::test]
    async fn test_drop_releases_locks() {
        let store = MockLockStore::new();
        {
            let mut a = store.open_session().await.unwrap();
            assert!(a.try_lock(LOCK).await.unwrap());
        }
        assert_eq!(store.holder(LOCK), None);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_killed_session_loses_lock_and_errors() {
        let store = MockLockStore::new();
        let mut a = store.open_session().await.unwrap();
        assert!(a.try_lock(LOCK).await.unwrap());

        store.kill_session(1);

        assert_eq!(store.holder(LOCK), None);
        let err = a.try_lock(LOCK).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MockLockStore::new();

        store.fail_next_sessions(1);
        assert!(store.open_session().await.is_err());

        let mut session = store.open_session().await.unwrap();
        store.fail_next_acquires(2);
        assert!(session.try_lock(LOCK).await.is_err());
        assert!(session.try_lock(LOCK).await.is_err());
        assert!(session.try_lock(LOCK).await.unwrap());

        store.fail_releases(Some(LeaderElectionError::connection("boom")));
        assert!(session.unlock(LOCK).await.is_err());
        assert_eq!(store.holder(LOCK), Some(1));

        store.fail_releases(None);
        assert!(session.unlock(LOCK).await.unwrap());

        let outcomes: Vec<Option<bool>> = store.acquires().iter().map(|c| c.outcome).collect();
        assert_eq!(outcomes, vec![None, None, Some(true)]);
        assert_eq!(store.release_count(LOCK), 2);
    }
}
