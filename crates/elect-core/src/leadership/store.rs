//! Contract of the backing lock store.
//!
//! The elector only needs two things from the store: a non-blocking,
//! integer-keyed, exclusive lock, and the guarantee that ownership belongs
//! to the *session* that took it. Sessions are opened once per elector and
//! kept for its whole lifetime, so acquire and release always run on the
//! same underlying connection.

use super::{LeaderElectionError, LockId};
use async_trait::async_trait;

/// A shared store that hands out lock sessions.
///
/// Implementations must be `Send + Sync + 'static` so a single store can be
/// shared (behind an `Arc`) by every elector in the process.
#[async_trait]
pub trait AdvisoryLockStore: Send + Sync + 'static {
    /// Opens a dedicated session.
    ///
    /// Locks taken through the returned session belong to it alone, and are
    /// released by the store when the session is closed or dropped.
    async fn open_session(&self) -> Result<Box<dyn LockSession>, LeaderElectionError>;
}

/// One pinned connection to the lock store.
#[async_trait]
pub trait LockSession: Send + 'static {
    /// Attempts to take the lock without waiting.
    ///
    /// Returns `Ok(true)` if this session now holds the lock and `Ok(false)`
    /// if another session holds it. Asking again for a lock this session
    /// already holds returns `Ok(true)` and does not take a second hold, so a
    /// single [`unlock`](Self::unlock) always frees it.
    async fn try_lock(&mut self, id: LockId) -> Result<bool, LeaderElectionError>;

    /// Releases the lock if this session holds it.
    ///
    /// Returns `Ok(false)` when the lock was not held by this session.
    async fn unlock(&mut self, id: LockId) -> Result<bool, LeaderElectionError>;

    /// Ends the session. Any lock still held is released by the store.
    async fn close(self: Box<Self>) -> Result<(), LeaderElectionError>;
}
