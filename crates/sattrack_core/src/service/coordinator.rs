//! Session Coordinator: composition root of registry, poller, and bus.
//!
//! # Responsibility
//! - Wire one Refresh Bus to the registry view-sync task and the poller.
//! - Own both background tasks and release them on shutdown or drop.
//! - Expose the read model and the `select`/`deselect`/`refresh` surface.
//!
//! # Invariants
//! - Any bus change triggers exactly one registry re-sync and one poller
//!   tick, however many publishes happened while a fetch was in flight.
//! - Mutation failures become a dismissible `error`; poll failures stay in
//!   the separate `poll_error` banner until a tick succeeds.
//! - No failure stops the coordinator; every operation can be retried.

use crate::config::TrackerConfig;
use crate::error::TrackingResult;
use crate::model::position::{PositionHistory, TrackStatus};
use crate::model::satellite::{Satellite, SatelliteId, Selection, SelectionId};
use crate::remote::SatelliteService;
use crate::service::position_poller::{ActiveSatellites, PollerPhase, PositionPoller};
use crate::service::refresh_bus::{RefreshBus, RefreshSubscriber, RefreshToken};
use crate::service::selection_registry::SelectionRegistry;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

const NOTICE_TRACKING_STARTED: &str = "Satellite tracking started successfully!";
const NOTICE_TRACKING_STOPPED: &str = "Satellite tracking stopped";

/// Unified read model offered to presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSnapshot {
    pub catalog: Vec<Satellite>,
    pub selections: Vec<Selection>,
    pub max_selections: usize,
    pub position_history: PositionHistory,
    pub loading: bool,
    /// Dismissible message of the last failed action or load.
    pub error: Option<String>,
    /// Dismissible message of the last successful action.
    pub notice: Option<String>,
    /// Persistent, non-blocking banner of the last failed poll tick.
    pub poll_error: Option<String>,
    pub last_update_time: Option<DateTime<Utc>>,
    pub refresh_token: RefreshToken,
    pub poller_phase: PollerPhase,
}

impl TrackingSnapshot {
    pub fn is_selected(&self, satellite_id: SatelliteId) -> bool {
        self.selections
            .iter()
            .any(|selection| selection.satellite_id == satellite_id)
    }

    /// Catalog entries that can still be offered for selection.
    pub fn available_satellites(&self) -> Vec<&Satellite> {
        self.catalog
            .iter()
            .filter(|satellite| !self.is_selected(satellite.id))
            .collect()
    }

    pub fn can_select(&self) -> bool {
        self.selections.len() < self.max_selections
    }

    pub fn track_status(&self, satellite_name: &str) -> TrackStatus {
        self.position_history.status(satellite_name)
    }

    /// Counter label such as `1 / 2 satellites selected`.
    pub fn selection_summary(&self) -> String {
        format!(
            "{} / {} satellites selected",
            self.selections.len(),
            self.max_selections
        )
    }
}

#[derive(Debug, Default)]
struct ViewMessages {
    error: Option<String>,
    notice: Option<String>,
    registry_loaded: bool,
}

#[derive(Debug, Default)]
struct ViewState {
    messages: Mutex<ViewMessages>,
}

impl ViewState {
    fn lock(&self) -> MutexGuard<'_, ViewMessages> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_error(&self, message: String) {
        let mut messages = self.lock();
        messages.notice = None;
        messages.error = Some(message);
    }

    fn set_notice(&self, message: &str) {
        let mut messages = self.lock();
        messages.error = None;
        messages.notice = Some(message.to_string());
    }

    fn clear(&self) {
        let mut messages = self.lock();
        messages.error = None;
        messages.notice = None;
    }
}

struct SyncTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// One user's tracking session.
pub struct TrackingCoordinator<S: SatelliteService + ?Sized + 'static> {
    session_id: Uuid,
    bus: RefreshBus,
    updates: RefreshBus,
    registry: Arc<SelectionRegistry<S>>,
    poller: PositionPoller<S>,
    view: Arc<ViewState>,
    sync_task: Mutex<Option<SyncTask>>,
}

impl<S: SatelliteService + ?Sized + 'static> TrackingCoordinator<S> {
    pub fn new(service: Arc<S>, config: &TrackerConfig) -> Self {
        let bus = RefreshBus::new();
        let updates = RefreshBus::new();
        // View sync reloads the registry on every publish.
        let registry = Arc::new(
            SelectionRegistry::new(Arc::clone(&service), bus.clone(), config.max_selections)
                .with_deferred_resync(),
        );
        let active: Arc<dyn ActiveSatellites> = registry.clone();
        let poller = PositionPoller::new(service, bus.clone(), config.poll_interval)
            .with_active_source(active)
            .with_update_signal(updates.clone());

        Self {
            session_id: Uuid::new_v4(),
            bus,
            updates,
            registry,
            poller,
            view: Arc::new(ViewState::default()),
            sync_task: Mutex::new(None),
        }
    }

    /// Correlation id used in log events of this session.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Loads catalog and selections, then starts view sync and polling.
    ///
    /// Load failures are reported through the read model. Calling `start`
    /// on a running coordinator is a no-op.
    pub async fn start(&self) {
        if lock(&self.sync_task).is_some() {
            return;
        }
        // Subscribe before the initial load so no publish is missed.
        let refresh = self.bus.subscribe();
        info!(
            "event=session_start module=coordinator status=start session_id={}",
            self.session_id
        );

        sync_registry(&self.registry, &self.view, &self.updates).await;

        let mut slot = lock(&self.sync_task);
        if slot.is_some() {
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_view_sync(
            Arc::clone(&self.registry),
            Arc::clone(&self.view),
            self.updates.clone(),
            refresh,
            shutdown_rx,
        ));
        *slot = Some(SyncTask { shutdown, handle });
        drop(slot);

        self.poller.start();
        info!(
            "event=session_start module=coordinator status=ok session_id={}",
            self.session_id
        );
    }

    /// Starts tracking a satellite; see `SelectionRegistry::select`.
    pub async fn select(&self, satellite_id: SatelliteId) -> TrackingResult<Selection> {
        self.view.clear();
        let result = self.registry.select(satellite_id).await;
        match &result {
            Ok(selection) => {
                info!(
                    "event=session_select module=coordinator status=ok session_id={} selection={}",
                    self.session_id, selection.id
                );
                self.view.set_notice(NOTICE_TRACKING_STARTED);
            }
            Err(err) => {
                warn!(
                    "event=session_select module=coordinator status=error session_id={} error_code={}",
                    self.session_id,
                    err.error_code()
                );
                self.view.set_error(err.to_string());
            }
        }
        self.updates.publish();
        result
    }

    /// Stops tracking a selection; see `SelectionRegistry::deselect`.
    pub async fn deselect(&self, selection_id: SelectionId) -> TrackingResult<()> {
        self.view.clear();
        let result = self.registry.deselect(selection_id).await;
        match &result {
            Ok(()) => {
                info!(
                    "event=session_deselect module=coordinator status=ok session_id={} selection={}",
                    self.session_id, selection_id
                );
                self.view.set_notice(NOTICE_TRACKING_STOPPED);
            }
            Err(err) => {
                warn!(
                    "event=session_deselect module=coordinator status=error session_id={} error_code={}",
                    self.session_id,
                    err.error_code()
                );
                self.view.set_error(err.to_string());
            }
        }
        self.updates.publish();
        result
    }

    /// Invalidates every view; registry and poller re-fetch once each.
    pub fn refresh(&self) -> RefreshToken {
        let token = self.bus.publish();
        info!(
            "event=session_refresh module=coordinator status=ok session_id={} token={}",
            self.session_id, token
        );
        token
    }

    /// Clears the dismissible error and notice.
    pub fn dismiss_messages(&self) {
        self.view.clear();
        self.updates.publish();
    }

    pub fn current_token(&self) -> RefreshToken {
        self.bus.current_token()
    }

    /// Subscriber that changes whenever the read model may have changed.
    pub fn subscribe_updates(&self) -> RefreshSubscriber {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        let poller = self.poller.snapshot();
        let (error, notice, registry_loaded) = {
            let messages = self.view.lock();
            (
                messages.error.clone(),
                messages.notice.clone(),
                messages.registry_loaded,
            )
        };

        TrackingSnapshot {
            catalog: self.registry.catalog(),
            selections: self.registry.selections(),
            max_selections: self.registry.max_selections(),
            position_history: poller.history,
            loading: !registry_loaded || poller.loading,
            error,
            notice,
            poll_error: poller.error.map(|err| err.to_string()),
            last_update_time: poller.last_update,
            refresh_token: self.bus.current_token(),
            poller_phase: poller.phase,
        }
    }

    /// Stops polling and view sync and waits for both tasks to exit.
    pub async fn shutdown(&self) {
        let task = lock(&self.sync_task).take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(err) = task.handle.await {
                warn!(
                    "event=session_stop module=coordinator status=error session_id={} error_code=join_failed error={}",
                    self.session_id, err
                );
            }
        }
        self.poller.shutdown().await;
        info!(
            "event=session_stop module=coordinator status=ok session_id={}",
            self.session_id
        );
    }
}

impl<S: SatelliteService + ?Sized + 'static> Drop for TrackingCoordinator<S> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.sync_task).take() {
            let _ = task.shutdown.send(true);
        }
        self.poller.stop();
    }
}

async fn run_view_sync<S: SatelliteService + ?Sized>(
    registry: Arc<SelectionRegistry<S>>,
    view: Arc<ViewState>,
    updates: RefreshBus,
    mut refresh: RefreshSubscriber,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            token = refresh.changed() => match token {
                Some(_) => sync_registry(&registry, &view, &updates).await,
                None => break,
            },
        }
    }
}

async fn sync_registry<S: SatelliteService + ?Sized>(
    registry: &SelectionRegistry<S>,
    view: &ViewState,
    updates: &RefreshBus,
) {
    let result = registry.reload().await;
    {
        let mut messages = view.lock();
        messages.registry_loaded = true;
        if let Err(err) = result {
            messages.notice = None;
            messages.error = Some(err.to_string());
        }
    }
    updates.publish();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
