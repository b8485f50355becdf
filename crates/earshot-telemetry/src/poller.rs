//! The telemetry poller.
//!
//! Each cycle asks the game server who is online and where each of them
//! stands, then swaps in a new [`Snapshot`] and publishes what changed.
//! Readers never block the poll loop: the snapshot lives in a `watch`
//! channel and events go out on a bounded `broadcast` channel that drops
//! the oldest entries when a subscriber falls behind.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::parse::{self, ROSTER_COMMAND};
use crate::{CycleScheduler, GameChannel, Position, Snapshot, TelemetryError, TelemetryEvent};

// ---------------------------------------------------------------------------
// WorldView
// ---------------------------------------------------------------------------

/// Read-only view of the world used by the session registry.
pub trait WorldView: Send + Sync + 'static {
    /// Whether `player` was on the roster at the last completed cycle.
    fn is_online(&self, player: &str) -> bool;

    /// Distance between two players' last known positions, or `0.0`
    /// when either position is unknown.
    fn distance(&self, a: &str, b: &str) -> f64;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Events buffered per subscriber before the oldest are dropped.
    /// Default: 256.
    pub event_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { event_capacity: 256 }
    }
}

impl PollerConfig {
    pub fn validated(mut self) -> Self {
        if self.event_capacity == 0 {
            warn!("event_capacity must be at least 1; using 1");
            self.event_capacity = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

struct Shared<C> {
    roster_channel: C,
    position_channel: C,
    snapshot: watch::Sender<Arc<Snapshot>>,
    events: broadcast::Sender<TelemetryEvent>,
    cycles: AtomicU64,
    running: AtomicBool,
    /// Held for the whole of a cycle so at most one runs at a time.
    cycle_lock: Mutex<()>,
}

/// Polls the game server and keeps the latest view of the world.
///
/// Cheap to clone; clones share the same state and background task.
pub struct Poller<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for Poller<C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<C: GameChannel> Poller<C> {
    /// Creates a poller. Nothing runs until [`start`](Self::start).
    ///
    /// The roster query goes to `roster_channel` and all position queries
    /// to `position_channel`.
    pub fn new(roster_channel: C, position_channel: C, config: PollerConfig) -> Self {
        let config = config.validated();
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::default()));
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            shared: Arc::new(Shared {
                roster_channel,
                position_channel,
                snapshot,
                events,
                cycles: AtomicU64::new(0),
                running: AtomicBool::new(false),
                cycle_lock: Mutex::new(()),
            }),
        }
    }

    /// Spawns the background task that polls every `interval`.
    ///
    /// The first cycle runs immediately. Fails with
    /// [`TelemetryError::AlreadyRunning`] if a task is already running.
    pub fn start(&self, interval: Duration) -> Result<PollerHandle, TelemetryError> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TelemetryError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(run(shared, interval, stop_rx));
        Ok(PollerHandle { stop: stop_tx, task })
    }

    /// Runs one cycle right now, outside the background schedule.
    ///
    /// If the background task is mid-cycle this waits for it to finish
    /// first, then diffs against the snapshot it produced.
    pub async fn poll_once(&self) -> Result<(), TelemetryError> {
        self.shared.cycle().await
    }

    /// Whether the background task is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Players online as of the last completed cycle.
    pub fn attendance(&self) -> BTreeSet<String> {
        self.shared.snapshot.borrow().roster.clone()
    }

    /// Last known position of `player`.
    pub fn position_of(&self, player: &str) -> Option<Position> {
        self.shared.snapshot.borrow().positions.get(player).copied()
    }

    /// Distance between two players, or `0.0` if either position is
    /// unknown. Callers that need to tell "unknown" from "same spot" should
    /// use [`position_of`](Self::position_of).
    pub fn distance(&self, a: &str, b: &str) -> f64 {
        let snapshot = self.shared.snapshot.borrow();
        match (snapshot.positions.get(a), snapshot.positions.get(b)) {
            (Some(pa), Some(pb)) => pa.distance(pb),
            _ => 0.0,
        }
    }

    /// The whole view from the last completed cycle.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.shared.snapshot.borrow())
    }

    /// Subscribes to changes. Only events from cycles completing after
    /// this call are delivered.
    pub fn events(&self) -> EventStream {
        EventStream { rx: self.shared.events.subscribe() }
    }
}

impl<C: GameChannel> WorldView for Poller<C> {
    fn is_online(&self, player: &str) -> bool {
        self.shared.snapshot.borrow().roster.contains(player)
    }

    fn distance(&self, a: &str, b: &str) -> f64 {
        Poller::distance(self, a, b)
    }
}

impl<C: GameChannel> Shared<C> {
    async fn cycle(&self) -> Result<(), TelemetryError> {
        let _serial = self.cycle_lock.lock().await;
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let reply = self.roster_channel.execute(ROSTER_COMMAND).await?;
        let roster = parse::parse_roster(&reply)?;

        let mut positions = HashMap::with_capacity(roster.len());
        for player in &roster {
            let reply = self
                .position_channel
                .execute(&parse::position_command(player))
                .await?;
            if let Some(position) = parse::parse_position(&reply)? {
                positions.insert(player.clone(), position);
            }
        }

        let previous = Arc::clone(&self.snapshot.borrow());
        let mut events = Vec::new();
        for player in previous.roster.difference(&roster) {
            events.push(TelemetryEvent::Left(player.clone()));
        }
        for player in roster.difference(&previous.roster) {
            events.push(TelemetryEvent::Joined(player.clone()));
        }
        for player in &roster {
            let Some(&position) = positions.get(player) else {
                continue;
            };
            if previous.positions.get(player) != Some(&position) {
                events.push(TelemetryEvent::Moved { player: player.clone(), position });
            }
        }

        trace!(
            cycle,
            online = roster.len(),
            located = positions.len(),
            events = events.len(),
            "telemetry cycle complete"
        );

        self.snapshot.send_replace(Arc::new(Snapshot { cycle, roster, positions }));
        for event in events {
            // Err only means nobody is subscribed.
            let _ = self.events.send(event);
        }
        Ok(())
    }
}

async fn run<C: GameChannel>(
    shared: Arc<Shared<C>>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut scheduler = CycleScheduler::new(interval);
    info!(interval_ms = scheduler.interval().as_millis() as u64, "poller started");

    loop {
        let info = tokio::select! {
            biased;
            _ = stop.changed() => break,
            info = scheduler.wait_for_cycle() => info,
        };

        let result = shared.cycle().await;
        scheduler.record_cycle_end(result.is_ok());
        if let Err(e) = result {
            warn!(cycle = info.cycle, error = %e, "telemetry cycle failed; keeping previous snapshot");
        }
    }

    shared.running.store(false, Ordering::Release);
    let metrics = scheduler.metrics();
    info!(
        cycles = metrics.total_cycles,
        failed = metrics.failed_cycles,
        "poller stopped"
    );
}

// ---------------------------------------------------------------------------
// Handle and event stream
// ---------------------------------------------------------------------------

/// Controls a running poller task.
///
/// Dropping the handle also stops the task.
pub struct PollerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Asks the task to stop. A cycle already in progress completes; no
    /// new cycle starts.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Waits for the task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "poller task ended abnormally");
        }
    }
}

/// A subscription to [`TelemetryEvent`]s.
pub struct EventStream {
    rx: broadcast::Receiver<TelemetryEvent>,
}

impl EventStream {
    /// The next event, or `None` once the poller is gone.
    ///
    /// If this subscriber fell behind, the oldest events were dropped;
    /// the gap is logged and the stream continues with the oldest event
    /// still buffered.
    pub async fn next(&mut self) -> Option<TelemetryEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "telemetry subscriber lagging; dropped oldest events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("telemetry event stream closed");
                    return None;
                }
            }
        }
    }
}
