//! The leader elector state machine and its election loop.

use super::{
    AdvisoryLockStore, ElectorConfig, ElectorPhase, ElectorStats, LeaderElectionError,
    LeadershipEvent, LockId, LockSession,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

type Callback = Box<dyn FnMut() + Send + 'static>;

/// Competes for one advisory lock on behalf of this process.
///
/// One elector is built per [`LockId`]. After [`start`](Self::start) a
/// background task polls the store every `poll_interval` and fires
/// `on_become_leader` / `on_lose_leadership` on each change of outcome.
/// [`stop`](Self::stop) ends the loop and gives the lock back.
///
/// The elector pins a single store session for its whole lifetime, so the
/// session that took the lock is the one that releases it.
///
/// # Example
///
/// ```rust
/// use elect_core::leadership::{ElectorConfig, LeaderElector, LockPurpose, MockLockStore};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let store = Arc::new(MockLockStore::new());
/// let elector = LeaderElector::new(
///     LockPurpose::JobsScheduler.lock_id(),
///     store,
///     ElectorConfig::new("instance-1"),
/// );
///
/// elector.start(
///     || println!("now running the jobs scheduler"),
///     || println!("scheduler handed off"),
/// );
///
/// if elector.is_leader() {
///     // leader-only work
/// }
///
/// elector.stop().await;
/// assert!(!elector.is_leader());
/// # }
/// ```
pub struct LeaderElector {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// State shared between the elector handle and its loop task.
struct Shared {
    lock_id: LockId,
    store: Arc<dyn AdvisoryLockStore>,
    config: ElectorConfig,
    state: RwLock<ElectorState>,
    /// The pinned store session; `None` until the first poll opens it.
    session: AsyncMutex<Option<Box<dyn LockSession>>>,
    stats: Counters,
}

#[derive(Debug, Default)]
struct ElectorState {
    held_by_me: bool,
    started: bool,
    phase: ElectorPhase,
}

/// What one poll produced: the store's answer and the edge it caused.
///
/// A poll can fail and still cause an edge, when the session that held the
/// lock had to be dropped.
struct PollOutcome {
    granted: Result<bool, LeaderElectionError>,
    event: Option<LeadershipEvent>,
}

#[derive(Debug, Default)]
struct Counters {
    polls: AtomicU64,
    poll_errors: AtomicU64,
    acquisitions: AtomicU64,
    losses: AtomicU64,
    releases: AtomicU64,
}

impl LeaderElector {
    /// Creates an idle elector for `lock_id`.
    ///
    /// Nothing touches the store until the first poll.
    pub fn new(lock_id: LockId, store: Arc<dyn AdvisoryLockStore>, config: ElectorConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                lock_id,
                store,
                config,
                state: RwLock::new(ElectorState::default()),
                session: AsyncMutex::new(None),
                stats: Counters::default(),
            }),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// The lock this elector competes for.
    pub fn lock_id(&self) -> LockId {
        self.shared.lock_id
    }

    /// Returns the configuration for this elector.
    pub fn config(&self) -> &ElectorConfig {
        &self.shared.config
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ElectorPhase {
        read_state(&self.shared.state).phase
    }

    /// Returns a snapshot of the elector's counters.
    pub fn stats(&self) -> ElectorStats {
        let c = &self.shared.stats;
        ElectorStats {
            polls: c.polls.load(Ordering::SeqCst),
            poll_errors: c.poll_errors.load(Ordering::SeqCst),
            acquisitions: c.acquisitions.load(Ordering::SeqCst),
            losses: c.losses.load(Ordering::SeqCst),
            releases: c.releases.load(Ordering::SeqCst),
        }
    }

    /// Returns the last observed leadership state.
    ///
    /// The answer can be up to one poll interval stale. Leader-only work that
    /// runs for long should check again while it runs.
    pub fn is_leader(&self) -> bool {
        read_state(&self.shared.state).held_by_me
    }

    /// Starts the election loop.
    ///
    /// The loop polls once right away and then every `poll_interval`.
    /// Callbacks run on the loop task, one at a time and in order; they must
    /// return quickly because the next poll waits for them.
    ///
    /// Must be called from within a tokio runtime, at most once per elector.
    ///
    /// An elector whose configuration fails [`ElectorConfig::validate`] logs
    /// the problem and stays idle.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the elector was already started or
    /// stopped. Release builds log a warning and ignore the call.
    pub fn start<B, L>(&self, on_become_leader: B, on_lose_leadership: L)
    where
        B: FnMut() + Send + 'static,
        L: FnMut() + Send + 'static,
    {
        if let Err(e) = self.shared.config.validate() {
            error!(
                instance_id = %self.shared.config.instance_id,
                lock = %self.shared.lock_id.name(),
                error = %e,
                "Refusing to start elector"
            );
            return;
        }

        {
            let mut state = write_state(&self.shared.state);
            if state.started || state.phase.is_terminal() {
                let phase = state.phase;
                drop(state);
                warn!(
                    instance_id = %self.shared.config.instance_id,
                    lock = %self.shared.lock_id.name(),
                    phase = ?phase,
                    "Ignoring start on an elector that was already started"
                );
                if cfg!(debug_assertions) {
                    panic!("LeaderElector::start called more than once");
                }
                return;
            }
            state.started = true;
            if state.phase == ElectorPhase::Idle {
                state.phase = ElectorPhase::Polling;
            }
        }

        let callbacks = Callbacks {
            on_become_leader: Box::new(on_become_leader),
            on_lose_leadership: Box::new(on_lose_leadership),
        };
        let handle = tokio::spawn(run_election_loop(
            Arc::clone(&self.shared),
            self.shutdown_tx.subscribe(),
            callbacks,
        ));

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Starts the election loop and delivers transitions as events.
    ///
    /// Equivalent to [`start`](Self::start) with callbacks that forward a
    /// [`LeadershipEvent`] per transition into the returned channel.
    pub fn start_with_events(&self) -> mpsc::UnboundedReceiver<LeadershipEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let lose_tx = tx.clone();
        self.start(
            move || {
                let _ = tx.send(LeadershipEvent::BecameLeader);
            },
            move || {
                let _ = lose_tx.send(LeadershipEvent::LostLeadership);
            },
        );
        rx
    }

    /// Polls the store once without starting the loop.
    ///
    /// Updates the same leadership flag the loop maintains and returns the
    /// outcome. No callbacks fire. A query error keeps the flag as it was;
    /// an error that costs the session also costs leadership, since the
    /// store drops the lock with it. After [`stop`](Self::stop) this returns
    /// [`LeaderElectionError::SessionClosed`] without contacting the store.
    pub async fn try_acquire_once(&self) -> Result<bool, LeaderElectionError> {
        let outcome = self.shared.poll().await;
        if let Some(event) = outcome.event {
            debug!(
                instance_id = %self.shared.config.instance_id,
                lock = %self.shared.lock_id.name(),
                event = event.as_str(),
                "One-shot poll changed leadership"
            );
        }
        outcome.granted
    }

    /// Stops the loop and gives up the lock.
    ///
    /// Waits for the loop task to exit, then, if this elector was leader,
    /// issues one release on the pinned session and closes it. Release
    /// failures are logged and otherwise ignored: once this returns the
    /// elector reports not-leader and never polls again.
    pub async fn stop(&self) {
        if self.phase().is_terminal() {
            debug!(
                instance_id = %self.shared.config.instance_id,
                lock = %self.shared.lock_id.name(),
                "Elector already stopped"
            );
            return;
        }

        self.shutdown_tx.send_replace(true);

        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(
                    instance_id = %self.shared.config.instance_id,
                    lock = %self.shared.lock_id.name(),
                    error = %e,
                    "Election loop terminated abnormally"
                );
            }
        }

        self.shared.shutdown().await;
    }
}

impl std::fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = read_state(&self.shared.state);
        f.debug_struct("LeaderElector")
            .field("lock_id", &self.shared.lock_id)
            .field("instance_id", &self.shared.config.instance_id)
            .field("phase", &state.phase)
            .field("held_by_me", &state.held_by_me)
            .finish()
    }
}

impl Shared {
    /// One poll attempt: open the pinned session if needed, then try the lock.
    ///
    /// Errors that leave the session in place keep the flag as it was.
    /// Errors that discard it clear the flag, because closing the session
    /// is what frees the lock for everyone else.
    async fn poll(&self) -> PollOutcome {
        let mut slot = self.session.lock().await;

        if read_state(&self.state).phase.is_terminal() {
            return PollOutcome {
                granted: Err(LeaderElectionError::SessionClosed),
                event: None,
            };
        }

        self.stats.polls.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("election_polls_total", "lock" => self.lock_id.name()).increment(1);

        let bound = self.config.operation_timeout;
        let attempt = tokio::time::timeout(bound, async {
            if slot.is_none() {
                *slot = Some(self.store.open_session().await?);
            }
            let session = slot.as_mut().ok_or(LeaderElectionError::SessionClosed)?;
            session.try_lock(self.lock_id).await
        })
        .await
        .unwrap_or_else(|_| Err(LeaderElectionError::timeout("acquire", bound)));

        match attempt {
            Ok(granted) => PollOutcome {
                granted: Ok(granted),
                event: self.record(granted),
            },
            Err(e) => {
                self.stats.poll_errors.fetch_add(1, Ordering::SeqCst);
                metrics::counter!("election_poll_errors_total", "lock" => self.lock_id.name())
                    .increment(1);

                let discard = e.invalidates_session() && slot.is_some();
                let event = if discard {
                    // Dropping the session closes its connection and with it
                    // any lock it held, so a rival may already be leader.
                    slot.take();
                    self.record(false)
                } else {
                    None
                };

                warn!(
                    instance_id = %self.config.instance_id,
                    lock = %self.lock_id.name(),
                    lock_key = self.lock_id.key(),
                    error = %e,
                    session_discarded = discard,
                    leader = read_state(&self.state).held_by_me,
                    "Leadership poll failed"
                );
                PollOutcome {
                    granted: Err(e),
                    event,
                }
            }
        }
    }

    /// Stores a poll outcome and reports the edge it caused, if any.
    fn record(&self, granted: bool) -> Option<LeadershipEvent> {
        let event = {
            let mut state = write_state(&self.state);
            let previous = state.held_by_me;
            state.held_by_me = granted;
            state.phase = if granted {
                ElectorPhase::Leader
            } else if state.started {
                ElectorPhase::Polling
            } else {
                ElectorPhase::Idle
            };
            LeadershipEvent::between(previous, granted)
        };

        match event {
            Some(LeadershipEvent::BecameLeader) => {
                self.stats.acquisitions.fetch_add(1, Ordering::SeqCst);
                info!(
                    instance_id = %self.config.instance_id,
                    lock = %self.lock_id.name(),
                    lock_key = self.lock_id.key(),
                    "Acquired leadership"
                );
            }
            Some(LeadershipEvent::LostLeadership) => {
                self.stats.losses.fetch_add(1, Ordering::SeqCst);
                warn!(
                    instance_id = %self.config.instance_id,
                    lock = %self.lock_id.name(),
                    lock_key = self.lock_id.key(),
                    "Lost leadership"
                );
            }
            None => {}
        }

        if let Some(event) = event {
            metrics::counter!(
                "election_transitions_total",
                "lock" => self.lock_id.name(),
                "direction" => event.as_str()
            )
            .increment(1);
            metrics::gauge!("election_is_leader", "lock" => self.lock_id.name())
                .set(if granted { 1.0 } else { 0.0 });
        }

        event
    }

    /// Releases the lock if held, closes the session and marks the elector stopped.
    ///
    /// Only the first caller does any work; later or concurrent callers
    /// find the elector stopped under the session lock and return.
    async fn shutdown(&self) {
        let mut slot = self.session.lock().await;
        if read_state(&self.state).phase.is_terminal() {
            return;
        }

        let bound = self.config.operation_timeout;
        let was_leader = read_state(&self.state).held_by_me;

        if was_leader {
            if let Some(session) = slot.as_mut() {
                self.stats.releases.fetch_add(1, Ordering::SeqCst);
                metrics::counter!("election_releases_total", "lock" => self.lock_id.name())
                    .increment(1);

                match tokio::time::timeout(bound, session.unlock(self.lock_id)).await {
                    Ok(Ok(true)) => info!(
                        instance_id = %self.config.instance_id,
                        lock = %self.lock_id.name(),
                        "Released leadership"
                    ),
                    Ok(Ok(false)) => warn!(
                        instance_id = %self.config.instance_id,
                        lock = %self.lock_id.name(),
                        "Release found the lock not held by this session"
                    ),
                    Ok(Err(e)) => warn!(
                        instance_id = %self.config.instance_id,
                        lock = %self.lock_id.name(),
                        error = %e,
                        "Failed to release leadership, clearing local state anyway"
                    ),
                    Err(_) => warn!(
                        instance_id = %self.config.instance_id,
                        lock = %self.lock_id.name(),
                        timeout = ?bound,
                        "Timed out releasing leadership, clearing local state anyway"
                    ),
                }
            } else {
                debug!(
                    instance_id = %self.config.instance_id,
                    lock = %self.lock_id.name(),
                    "Session already gone, nothing to release"
                );
            }
        }

        if let Some(session) = slot.take() {
            match tokio::time::timeout(bound, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    instance_id = %self.config.instance_id,
                    lock = %self.lock_id.name(),
                    error = %e,
                    "Failed to close lock session"
                ),
                Err(_) => warn!(
                    instance_id = %self.config.instance_id,
                    lock = %self.lock_id.name(),
                    "Timed out closing lock session"
                ),
            }
        }

        {
            let mut state = write_state(&self.state);
            state.held_by_me = false;
            state.phase = ElectorPhase::Stopped;
        }
        metrics::gauge!("election_is_leader", "lock" => self.lock_id.name()).set(0.0);

        info!(
            instance_id = %self.config.instance_id,
            lock = %self.lock_id.name(),
            "Elector stopped"
        );
    }
}

struct Callbacks {
    on_become_leader: Callback,
    on_lose_leadership: Callback,
}

impl Callbacks {
    fn fire(&mut self, event: LeadershipEvent, lock_id: LockId) {
        let callback = match event {
            LeadershipEvent::BecameLeader => &mut self.on_become_leader,
            LeadershipEvent::LostLeadership => &mut self.on_lose_leadership,
        };

        if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
            error!(
                lock = %lock_id.name(),
                event = event.as_str(),
                "Leadership callback panicked"
            );
        }
    }
}

async fn run_election_loop(
    shared: Arc<Shared>,
    mut shutdown_rx: watch::Receiver<bool>,
    mut callbacks: Callbacks,
) {
    let mut interval = tokio::time::interval(shared.config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        instance_id = %shared.config.instance_id,
        lock = %shared.lock_id.name(),
        lock_key = shared.lock_id.key(),
        interval_ms = shared.config.poll_interval.as_millis() as u64,
        "Starting election loop"
    );

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                // An error means the elector handle was dropped.
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                // Errors are logged inside `poll`; try again next tick.
                if let Some(event) = shared.poll().await.event {
                    callbacks.fire(event, shared.lock_id);
                }
            }
        }
    }

    debug!(
        instance_id = %shared.config.instance_id,
        lock = %shared.lock_id.name(),
        "Election loop exited"
    );
}

fn read_state(state: &RwLock<ElectorState>) -> RwLockReadGuard<'_, ElectorState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_state(state: &RwLock<ElectorState>) -> RwLockWriteGuard<'_, ElectorState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}
