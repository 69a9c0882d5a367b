//! Position Poller: periodic, overlap-free position acquisition.
//!
//! # Responsibility
//! - Fetch positions of all active satellites in one call per tick.
//! - Tick immediately on start, then on a fixed interval, and out of band
//!   whenever the Refresh Bus moves (which also resets the interval phase).
//! - Own the current `PositionHistory` and the poll error banner.
//!
//! # Invariants
//! - Phase changes go through `PollerPhase::on`; `Fetching` admits no second
//!   tick, so a slow fetch never overlaps the next one.
//! - A failed tick keeps the previous history and sets the error; the next
//!   successful tick replaces the history wholesale and clears the error.
//! - `stop()` is idempotent, valid before `start()`, and also runs on drop.
//! - Results of a fetch that finishes after `stop()` are discarded.

use crate::error::TrackingError;
use crate::model::position::PositionHistory;
use crate::remote::SatelliteService;
use crate::service::refresh_bus::{RefreshBus, RefreshSubscriber, RefreshToken};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

const POLL_FAILED: &str = "Failed to load satellite positions";
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Source of the satellite names that should currently be polled.
pub trait ActiveSatellites: Send + Sync {
    /// `None` when the set is not known yet; the poller then always fetches.
    fn active_satellites(&self) -> Option<Vec<String>>;
}

/// Scheduler state of the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerPhase {
    /// Never started; manual polls are still allowed.
    Idle,
    /// Timer armed, waiting for the next tick.
    Scheduled,
    /// One fetch in flight.
    Fetching,
    /// Timer released; late results are discarded.
    Stopped,
}

/// Inputs of the poller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerEvent {
    Start,
    TickDue,
    FetchDone { timer_running: bool },
    Stop,
}

impl PollerPhase {
    /// Single transition table. `None` means the event is refused.
    pub fn on(self, event: PollerEvent) -> Option<PollerPhase> {
        use PollerEvent as E;
        use PollerPhase as P;

        match (self, event) {
            (P::Idle | P::Stopped, E::Start) => Some(P::Scheduled),
            (P::Scheduled | P::Fetching, E::Start) => None,
            (P::Idle | P::Scheduled, E::TickDue) => Some(P::Fetching),
            (P::Fetching | P::Stopped, E::TickDue) => None,
            (P::Fetching, E::FetchDone { timer_running }) => Some(if timer_running {
                P::Scheduled
            } else {
                P::Idle
            }),
            (P::Idle | P::Scheduled | P::Stopped, E::FetchDone { .. }) => None,
            (P::Idle, E::Stop) => Some(P::Idle),
            (P::Scheduled | P::Fetching | P::Stopped, E::Stop) => Some(P::Stopped),
        }
    }
}

/// What caused one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTrigger {
    Interval,
    Refresh(RefreshToken),
    Manual,
}

impl TickTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Refresh(_) => "refresh",
            Self::Manual => "manual",
        }
    }
}

/// Result of one tick attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// History replaced; `satellites` keys present.
    Updated { satellites: usize },
    /// Fetch failed; previous history retained.
    Failed(TrackingError),
    /// Another tick was in flight, or the poller is stopped.
    Skipped,
    /// Poller was stopped or restarted while fetching.
    Discarded,
}

/// Read model of the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerSnapshot {
    pub phase: PollerPhase,
    pub history: PositionHistory,
    /// Poll banner; set by a failed tick, cleared by a successful one.
    pub error: Option<TrackingError>,
    pub last_update: Option<DateTime<Utc>>,
    /// True until the first tick after start has resolved.
    pub loading: bool,
    pub completed_ticks: u64,
    pub failed_ticks: u64,
}

#[derive(Debug)]
struct PollerState {
    phase: PollerPhase,
    generation: u64,
    timer_running: bool,
    history: PositionHistory,
    error: Option<TrackingError>,
    last_update: Option<DateTime<Utc>>,
    loading: bool,
    completed_ticks: u64,
    failed_ticks: u64,
}

struct PollerShared<S: SatelliteService + ?Sized> {
    service: Arc<S>,
    bus: RefreshBus,
    interval: Duration,
    active: Option<Arc<dyn ActiveSatellites>>,
    updates: Option<RefreshBus>,
    state: Mutex<PollerState>,
}

struct PollerTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic position poller bound to one Refresh Bus.
pub struct PositionPoller<S: SatelliteService + ?Sized + 'static> {
    shared: Arc<PollerShared<S>>,
    task: Mutex<Option<PollerTask>>,
}

impl<S: SatelliteService + ?Sized + 'static> PositionPoller<S> {
    pub fn new(service: Arc<S>, bus: RefreshBus, interval: Duration) -> Self {
        Self {
            shared: Arc::new(PollerShared {
                service,
                bus,
                interval: interval.max(MIN_INTERVAL),
                active: None,
                updates: None,
                state: Mutex::new(PollerState {
                    phase: PollerPhase::Idle,
                    generation: 0,
                    timer_running: false,
                    history: PositionHistory::new(),
                    error: None,
                    last_update: None,
                    loading: true,
                    completed_ticks: 0,
                    failed_ticks: 0,
                }),
            }),
            task: Mutex::new(None),
        }
    }

    /// Uses `source` to skip the round trip when nothing is selected.
    ///
    /// Must be called before the poller is shared or started.
    pub fn with_active_source(mut self, source: Arc<dyn ActiveSatellites>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.active = Some(source);
        }
        self
    }

    /// Publishes to `updates` after every resolved tick.
    ///
    /// Must be called before the poller is shared or started.
    pub fn with_update_signal(mut self, updates: RefreshBus) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.updates = Some(updates);
        }
        self
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Arms the timer and ticks immediately.
    ///
    /// Returns `false` when the timer is already running or a manual poll is
    /// in flight. Must be called inside a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = lock(&self.task);
        let generation = {
            let mut state = self.shared.lock_state();
            let Some(next) = state.phase.on(PollerEvent::Start) else {
                return false;
            };
            state.phase = next;
            state.generation += 1;
            state.timer_running = true;
            state.loading = true;
            state.generation
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let refresh = self.shared.bus.subscribe();
        let shared = Arc::clone(&self.shared);
        let handle =
            tokio::spawn(async move { shared.run(generation, refresh, shutdown_rx).await });

        info!(
            "event=poller_start module=poller status=ok generation={} interval_ms={}",
            generation,
            self.shared.interval.as_millis()
        );
        *task = Some(PollerTask { shutdown, handle });
        true
    }

    /// Cancels the timer. Idempotent and safe before `start()`.
    pub fn stop(&self) {
        let task = lock(&self.task).take();
        let stopped = {
            let mut state = self.shared.lock_state();
            let previous = state.phase;
            if let Some(next) = previous.on(PollerEvent::Stop) {
                state.phase = next;
            }
            state.timer_running = false;
            previous != state.phase
        };

        if let Some(task) = task {
            // The task exits at its next await point; an in-flight fetch is
            // left to finish and its result is discarded.
            let _ = task.shutdown.send(true);
            drop(task.handle);
        }
        if stopped {
            info!("event=poller_stop module=poller status=ok");
            self.shared.notify_update();
        }
    }

    /// Stops the timer and waits for the polling task to exit.
    pub async fn shutdown(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            self.stop();
            if let Err(err) = task.handle.await {
                warn!(
                    "event=poller_stop module=poller status=error error_code=join_failed error={}",
                    err
                );
            }
        } else {
            self.stop();
        }
    }

    /// Runs one tick in the caller's task, outside the timer schedule.
    ///
    /// Returns `TickOutcome::Skipped` while another tick is fetching.
    pub async fn poll_once(&self) -> TickOutcome {
        self.shared.run_tick(TickTrigger::Manual).await
    }

    pub fn phase(&self) -> PollerPhase {
        self.shared.lock_state().phase
    }

    pub fn history(&self) -> PositionHistory {
        self.shared.lock_state().history.clone()
    }

    pub fn snapshot(&self) -> PollerSnapshot {
        let state = self.shared.lock_state();
        PollerSnapshot {
            phase: state.phase,
            history: state.history.clone(),
            error: state.error.clone(),
            last_update: state.last_update,
            loading: state.loading,
            completed_ticks: state.completed_ticks,
            failed_ticks: state.failed_ticks,
        }
    }
}

impl<S: SatelliteService + ?Sized + 'static> Drop for PositionPoller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: SatelliteService + ?Sized> PollerShared<S> {
    async fn run(
        self: Arc<Self>,
        generation: u64,
        mut refresh: RefreshSubscriber,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut bus_open = true;

        loop {
            let trigger = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    // This tick observes every publish made so far.
                    refresh.acknowledge();
                    TickTrigger::Interval
                }
                token = refresh.changed(), if bus_open => match token {
                    Some(token) => {
                        ticker.reset();
                        TickTrigger::Refresh(token)
                    }
                    None => {
                        bus_open = false;
                        continue;
                    }
                },
            };

            if *shutdown.borrow() {
                break;
            }
            self.run_tick(trigger).await;
        }

        debug!(
            "event=poller_task module=poller status=exit generation={}",
            generation
        );
    }

    async fn run_tick(&self, trigger: TickTrigger) -> TickOutcome {
        let Some(generation) = self.begin_tick() else {
            debug!(
                "event=poll_tick module=poller status=skipped trigger={}",
                trigger.as_str()
            );
            return TickOutcome::Skipped;
        };

        let started_at = Instant::now();
        let active = self
            .active
            .as_ref()
            .and_then(|source| source.active_satellites());
        let result = match active {
            Some(names) if names.is_empty() => Ok(PositionHistory::new()),
            _ => self.service.fetch_positions().await,
        };

        let outcome = self.finish_tick(generation, result.map_err(|err| err.to_string()));
        match &outcome {
            TickOutcome::Updated { satellites } => info!(
                "event=poll_tick module=poller status=ok trigger={} satellites={} duration_ms={}",
                trigger.as_str(),
                satellites,
                started_at.elapsed().as_millis()
            ),
            TickOutcome::Failed(err) => warn!(
                "event=poll_tick module=poller status=error trigger={} duration_ms={} error_code={} error={}",
                trigger.as_str(),
                started_at.elapsed().as_millis(),
                err.error_code(),
                err
            ),
            TickOutcome::Discarded => debug!(
                "event=poll_tick module=poller status=discarded trigger={}",
                trigger.as_str()
            ),
            TickOutcome::Skipped => {}
        }
        outcome
    }

    fn begin_tick(&self) -> Option<u64> {
        let mut state = self.lock_state();
        let next = state.phase.on(PollerEvent::TickDue)?;
        state.phase = next;
        Some(state.generation)
    }

    fn finish_tick(&self, generation: u64, result: Result<PositionHistory, String>) -> TickOutcome {
        let outcome = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return TickOutcome::Discarded;
            }
            let event = PollerEvent::FetchDone {
                timer_running: state.timer_running,
            };
            let Some(next) = state.phase.on(event) else {
                return TickOutcome::Discarded;
            };
            state.phase = next;
            state.loading = false;

            match result {
                Ok(history) => {
                    let satellites = history.len();
                    state.history = history;
                    state.error = None;
                    state.last_update = Some(Utc::now());
                    state.completed_ticks += 1;
                    TickOutcome::Updated { satellites }
                }
                Err(message) => {
                    let err = TrackingError::PollFailure(format!("{POLL_FAILED}: {message}"));
                    state.error = Some(err.clone());
                    state.failed_ticks += 1;
                    TickOutcome::Failed(err)
                }
            }
        };
        self.notify_update();
        outcome
    }

    fn notify_update(&self) {
        if let Some(updates) = &self.updates {
            updates.publish();
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PollerState> {
        lock(&self.state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
