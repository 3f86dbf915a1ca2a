//! Change detection and live tailing
//!
//! Tailing never reads a file incrementally. A cheap [`Fingerprint`] (size
//! and modification time) decides whether anything changed; on change the
//! whole session is reassembled and diffed against the previously observed
//! event count.
//!
//! ```text
//! tick ──► Fingerprint::of ──unchanged──► (nothing)
//!                │
//!             changed
//!                ▼
//!     SessionAssembler::assemble ──► ChangeDetector::observe ──► TailUpdate
//! ```
//!
//! [`run_tail`] drives any [`TailSource`] on a tokio interval, offloading the
//! blocking work with `spawn_blocking` under a timeout.

use crate::config::TailConfig;
use crate::error::{Error, Result};
use crate::ingest::SessionAssembler;
use crate::types::{AgentMap, Event, Session};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

// ============================================
// Fingerprints and deltas
// ============================================

/// Cheap proxy for "this file changed". Not a content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl Fingerprint {
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// True when there is no previous fingerprint or it differs from `new`.
pub fn has_changed(old: Option<&Fingerprint>, new: &Fingerprint) -> bool {
    old != Some(new)
}

/// Which events a consumer has not seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Events from `start` onward are new
    Append { start: usize },
    /// Fewer events than previously observed; the consumer must start over
    Restart,
}

/// Compute the delta between a previous observation and `current` events.
///
/// A first observation (`previous == None`) yields only the last
/// `initial_tail` events.
pub fn compute_delta(previous: Option<usize>, current: usize, initial_tail: usize) -> DeltaOutcome {
    match previous {
        None => DeltaOutcome::Append {
            start: current.saturating_sub(initial_tail),
        },
        Some(seen) if current >= seen => DeltaOutcome::Append { start: seen },
        Some(_) => DeltaOutcome::Restart,
    }
}

/// Events new since the last observation, plus the full current agent map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDelta {
    pub events: Vec<Event>,
    pub agents: AgentMap,
    pub total_events: usize,
}

/// What a tail emits after observing a change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TailUpdate {
    /// First observation, full session
    Snapshot(Session),
    Delta(SessionDelta),
    /// The file shrank; discard everything seen so far
    Replace(Session),
}

/// What the first observation of a session sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialView {
    /// The whole session as a [`TailUpdate::Snapshot`]
    Full,
    /// A [`TailUpdate::Delta`] holding only the most recent `n` events
    Recent(usize),
}

/// Per-file observation state.
#[derive(Debug)]
pub struct ChangeDetector {
    initial_view: InitialView,
    fingerprint: Option<Fingerprint>,
    last_count: Option<usize>,
    last_agents: AgentMap,
}

impl ChangeDetector {
    pub fn new(initial_view: InitialView) -> Self {
        Self {
            initial_view,
            fingerprint: None,
            last_count: None,
            last_agents: AgentMap::new(),
        }
    }

    pub fn has_changed(&self, fingerprint: &Fingerprint) -> bool {
        has_changed(self.fingerprint.as_ref(), fingerprint)
    }

    /// Event count of the last observation, if any.
    pub fn last_count(&self) -> Option<usize> {
        self.last_count
    }

    /// Record a freshly assembled session and decide what to emit.
    ///
    /// After the first observation, a delta is emitted when there are new
    /// events or the agent aggregates changed.
    pub fn observe(&mut self, fingerprint: Fingerprint, session: Session) -> Option<TailUpdate> {
        self.fingerprint = Some(fingerprint);
        let previous = self.last_count.replace(session.event_count());
        let agents_changed = self.last_agents != session.agents;
        self.last_agents = session.agents.clone();

        if previous.is_none() {
            if let InitialView::Full = self.initial_view {
                return Some(TailUpdate::Snapshot(session));
            }
        }

        let initial_tail = match self.initial_view {
            InitialView::Full => 0,
            InitialView::Recent(n) => n,
        };
        match compute_delta(previous, session.event_count(), initial_tail) {
            DeltaOutcome::Restart => {
                tracing::info!(
                    session_id = %session.id,
                    previous = ?previous,
                    current = session.event_count(),
                    "Session shrank, replacing"
                );
                Some(TailUpdate::Replace(session))
            }
            DeltaOutcome::Append { start } => {
                if previous.is_some() && start == session.event_count() && !agents_changed {
                    return None;
                }
                let total_events = session.event_count();
                let Session { mut events, agents, .. } = session;
                Some(TailUpdate::Delta(SessionDelta {
                    events: events.split_off(start),
                    agents,
                    total_events,
                }))
            }
        }
    }
}

// ============================================
// Tailing one session
// ============================================

/// One file being tailed.
#[derive(Debug)]
pub struct SessionTail {
    path: PathBuf,
    assembler: Arc<SessionAssembler>,
    detector: ChangeDetector,
}

impl SessionTail {
    pub fn new(
        path: impl Into<PathBuf>,
        assembler: Arc<SessionAssembler>,
        initial_view: InitialView,
    ) -> Self {
        Self {
            path: path.into(),
            assembler,
            detector: ChangeDetector::new(initial_view),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file once; reassemble and diff when it changed.
    ///
    /// A failed assembly leaves the state untouched so the next poll retries.
    pub fn poll(&mut self) -> Result<Option<TailUpdate>> {
        let fingerprint = Fingerprint::of(&self.path)?;
        if !self.detector.has_changed(&fingerprint) {
            return Ok(None);
        }
        let session = self.assembler.assemble(&self.path)?;
        Ok(self.detector.observe(fingerprint, session))
    }
}

// ============================================
// Async poll loop
// ============================================

/// Anything a tail loop can poll.
pub trait TailSource: Send + 'static {
    type Update: Send + 'static;

    /// One blocking poll; `Ok(None)` means nothing to report.
    fn poll(&mut self) -> Result<Option<Self::Update>>;
}

impl TailSource for SessionTail {
    type Update = TailUpdate;

    fn poll(&mut self) -> Result<Option<TailUpdate>> {
        SessionTail::poll(self)
    }
}

/// Timing of a tail loop.
#[derive(Debug, Clone, Copy)]
pub struct TailOptions {
    pub interval: Duration,
    /// Upper bound on one poll's blocking work
    pub read_timeout: Duration,
}

impl TailOptions {
    pub fn session(config: &TailConfig) -> Self {
        Self {
            interval: config.session_poll_interval(),
            read_timeout: config.read_timeout(),
        }
    }

    pub fn merged(config: &TailConfig) -> Self {
        Self {
            interval: config.merged_poll_interval(),
            read_timeout: config.read_timeout(),
        }
    }
}

/// Poll `source` until shutdown or until the receiver goes away.
///
/// The first poll runs immediately. Errors are logged and the loop carries
/// on at the next tick; there are no retries within a tick. A poll that
/// timed out may still be running; ticks are skipped until it finishes.
pub async fn run_tail<T: TailSource>(
    source: T,
    options: TailOptions,
    updates: mpsc::Sender<T::Update>,
    mut shutdown: watch::Receiver<bool>,
) {
    let source = Arc::new(Mutex::new(source));
    let in_flight = Arc::new(AtomicBool::new(false));
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            _ = updates.closed() => break,
            _ = ticker.tick() => {}
        }

        if in_flight.load(Ordering::Acquire) {
            tracing::debug!("Previous poll still running, skipping tick");
            continue;
        }

        match poll_blocking(&source, &in_flight, options.read_timeout).await {
            Ok(Some(update)) => {
                if updates.send(update).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Tail poll failed"),
        }
    }

    tracing::debug!("Tail loop stopped");
}

/// Tail one session with the configured session interval.
///
/// The returned future owns everything it needs and can be spawned.
pub fn run_session_tail(
    tail: SessionTail,
    config: &TailConfig,
    updates: mpsc::Sender<TailUpdate>,
    shutdown: watch::Receiver<bool>,
) -> impl Future<Output = ()> + Send + 'static {
    tracing::info!(path = %tail.path().display(), "Starting session tail");
    run_tail(tail, TailOptions::session(config), updates, shutdown)
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        // sender dropped counts as shutdown
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Clears the in-flight flag when the blocking poll ends, even by panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn poll_blocking<T: TailSource>(
    source: &Arc<Mutex<T>>,
    in_flight: &Arc<AtomicBool>,
    read_timeout: Duration,
) -> Result<Option<T::Update>> {
    let source = Arc::clone(source);
    in_flight.store(true, Ordering::Release);
    let guard = InFlight(Arc::clone(in_flight));
    let task = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        lock(&source).poll()
    });

    match tokio::time::timeout(read_timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(Error::Worker(join_error.to_string())),
        Err(_) => Err(Error::Timeout(read_timeout)),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
