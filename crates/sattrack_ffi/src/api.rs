//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Own the process-wide tracking session and the runtime that drives it.
//! - Flatten the core read model into FRB-friendly view structs.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - At most one tracking session is open per process.
//! - Timestamps cross the boundary as UTC epoch milliseconds.
//!
//! # See also
//! - sattrack_core::service::coordinator

use sattrack_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    HttpSatelliteService, PositionSample, StaticSession, TrackStatus, TrackerConfig,
    TrackingCoordinator, TrackingSnapshot,
};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::runtime::Runtime;

type FfiCoordinator = TrackingCoordinator<HttpSatelliteService<StaticSession>>;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static TRACKER: Mutex<Option<Arc<FfiCoordinator>>> = Mutex::new(None);

const NOT_OPEN: &str = "tracker is not open";

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - UI-thread safe for current implementation.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may perform small file-system setup work.
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Generic action response envelope for tracking commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Selection ID created by `tracker_select`.
    pub selection_id: Option<i64>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl TrackerActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            selection_id: None,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            selection_id: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatelliteView {
    pub id: i64,
    pub name: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionView {
    pub selection_id: i64,
    pub satellite_id: i64,
    pub satellite_name: String,
    pub selected_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionView {
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub velocity: Option<f64>,
}

/// Position track of one satellite, newest sample first.
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteTrackView {
    pub satellite_name: String,
    /// `waiting` while the history is empty, otherwise `tracking`.
    pub status: String,
    pub samples: Vec<PositionView>,
}

/// Flattened read model for one UI frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshotView {
    /// False when no session is open; all other fields are then empty.
    pub open: bool,
    pub satellites: Vec<SatelliteView>,
    pub selections: Vec<SelectionView>,
    pub tracks: Vec<SatelliteTrackView>,
    pub selection_summary: String,
    pub can_select: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub poll_error: Option<String>,
    pub last_update_ms: Option<i64>,
    pub refresh_token: u64,
}

impl TrackerSnapshotView {
    fn closed() -> Self {
        Self {
            open: false,
            satellites: Vec::new(),
            selections: Vec::new(),
            tracks: Vec::new(),
            selection_summary: String::new(),
            can_select: false,
            loading: false,
            error: None,
            notice: None,
            poll_error: None,
            last_update_ms: None,
            refresh_token: 0,
        }
    }
}

/// Opens the tracking session and performs the initial load.
///
/// Input semantics:
/// - `api_base_url`: overrides `SATTRACK_API_URL` when non-blank.
/// - `access_token`: bearer token; blank means anonymous.
///
/// # FFI contract
/// - Async call on the FRB worker pool; blocks on network I/O.
/// - Replaces a previously open session.
/// - Load failures do not fail the call; they surface in the snapshot.
pub fn tracker_open(
    api_base_url: Option<String>,
    username: String,
    access_token: Option<String>,
) -> TrackerActionResponse {
    let mut config = match TrackerConfig::from_env() {
        Ok(config) => config,
        Err(err) => return TrackerActionResponse::failure(format!("tracker_open failed: {err}")),
    };
    if let Some(url) = api_base_url.filter(|url| !url.trim().is_empty()) {
        config.api_base_url = url;
        config = match config.validated() {
            Ok(config) => config,
            Err(err) => {
                return TrackerActionResponse::failure(format!("tracker_open failed: {err}"))
            }
        };
    }

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(err) => return TrackerActionResponse::failure(format!("tracker_open failed: {err}")),
    };
    let service = match HttpSatelliteService::new(
        &config,
        StaticSession::new(username.trim(), access_token),
    ) {
        Ok(service) => Arc::new(service),
        Err(err) => return TrackerActionResponse::failure(format!("tracker_open failed: {err}")),
    };

    let previous = lock_tracker().take();
    let coordinator = Arc::new(TrackingCoordinator::new(service, &config));
    runtime.block_on(async {
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        coordinator.start().await;
    });
    log::info!(
        "event=ffi_tracker_open module=ffi status=ok session_id={}",
        coordinator.session_id()
    );
    *lock_tracker() = Some(coordinator);
    TrackerActionResponse::success("Tracker opened.")
}

/// Returns the current read model.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never panics; returns a closed view when no session is open.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_snapshot() -> TrackerSnapshotView {
    match current_tracker() {
        Some(tracker) => to_snapshot_view(&tracker.snapshot()),
        None => TrackerSnapshotView::closed(),
    }
}

/// Starts tracking the catalog satellite `satellite_id`.
///
/// # FFI contract
/// - Async call on the FRB worker pool; blocks on network I/O.
/// - Never panics.
/// - Returns the created selection ID on success.
pub fn tracker_select(satellite_id: i64) -> TrackerActionResponse {
    with_tracker("tracker_select", |runtime, tracker| {
        match runtime.block_on(tracker.select(satellite_id)) {
            Ok(selection) => TrackerActionResponse {
                ok: true,
                selection_id: Some(selection.id),
                message: format!("Tracking {}.", selection.satellite_name),
            },
            Err(err) => TrackerActionResponse::failure(err.to_string()),
        }
    })
}

/// Stops tracking the selection `selection_id`.
///
/// # FFI contract
/// - Async call on the FRB worker pool; blocks on network I/O.
/// - Never panics.
pub fn tracker_deselect(selection_id: i64) -> TrackerActionResponse {
    with_tracker("tracker_deselect", |runtime, tracker| {
        match runtime.block_on(tracker.deselect(selection_id)) {
            Ok(()) => TrackerActionResponse::success("Tracking stopped."),
            Err(err) => TrackerActionResponse::failure(err.to_string()),
        }
    })
}

/// Asks every view to re-fetch once.
///
/// # FFI contract
/// - Sync call, non-blocking; the re-fetch runs in the background.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_refresh() -> TrackerActionResponse {
    with_tracker("tracker_refresh", |_, tracker| {
        let token = tracker.refresh();
        TrackerActionResponse::success(format!("Refresh {token} requested."))
    })
}

/// Clears the dismissible error and notice.
#[flutter_rust_bridge::frb(sync)]
pub fn tracker_dismiss_messages() -> TrackerActionResponse {
    with_tracker("tracker_dismiss_messages", |_, tracker| {
        tracker.dismiss_messages();
        TrackerActionResponse::success("Messages dismissed.")
    })
}

/// Stops polling and releases the session. Idempotent.
pub fn tracker_close() -> TrackerActionResponse {
    let Some(tracker) = lock_tracker().take() else {
        return TrackerActionResponse::success("Tracker already closed.");
    };
    match runtime() {
        Ok(runtime) => runtime.block_on(tracker.shutdown()),
        Err(err) => log::warn!(
            "event=ffi_tracker_close module=ffi status=error error_code=runtime_unavailable error={}",
            err
        ),
    }
    TrackerActionResponse::success("Tracker closed.")
}

fn runtime() -> Result<&'static Runtime, String> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let built = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("sattrack-ffi")
        .enable_all()
        .build()
        .map_err(|err| format!("runtime init failed: {err}"))?;
    Ok(RUNTIME.get_or_init(|| built))
}

fn lock_tracker() -> MutexGuard<'static, Option<Arc<FfiCoordinator>>> {
    TRACKER.lock().unwrap_or_else(PoisonError::into_inner)
}

fn current_tracker() -> Option<Arc<FfiCoordinator>> {
    lock_tracker().clone()
}

fn with_tracker(
    op: &str,
    f: impl FnOnce(&Runtime, &FfiCoordinator) -> TrackerActionResponse,
) -> TrackerActionResponse {
    let Some(tracker) = current_tracker() else {
        return TrackerActionResponse::failure(format!("{op} failed: {NOT_OPEN}"));
    };
    match runtime() {
        Ok(runtime) => f(runtime, &tracker),
        Err(err) => TrackerActionResponse::failure(format!("{op} failed: {err}")),
    }
}

fn to_snapshot_view(snapshot: &TrackingSnapshot) -> TrackerSnapshotView {
    TrackerSnapshotView {
        open: true,
        satellites: snapshot
            .catalog
            .iter()
            .map(|satellite| SatelliteView {
                id: satellite.id,
                name: satellite.name.clone(),
                selected: snapshot.is_selected(satellite.id),
            })
            .collect(),
        selections: snapshot
            .selections
            .iter()
            .map(|selection| SelectionView {
                selection_id: selection.id,
                satellite_id: selection.satellite_id,
                satellite_name: selection.satellite_name.clone(),
                selected_at_ms: selection.selected_at.timestamp_millis(),
            })
            .collect(),
        tracks: snapshot
            .position_history
            .iter()
            .map(|(name, samples)| SatelliteTrackView {
                satellite_name: name.to_string(),
                status: track_status_label(snapshot.track_status(name)).to_string(),
                samples: samples.iter().map(to_position_view).collect(),
            })
            .collect(),
        selection_summary: snapshot.selection_summary(),
        can_select: snapshot.can_select(),
        loading: snapshot.loading,
        error: snapshot.error.clone(),
        notice: snapshot.notice.clone(),
        poll_error: snapshot.poll_error.clone(),
        last_update_ms: snapshot.last_update_time.map(|time| time.timestamp_millis()),
        refresh_token: snapshot.refresh_token,
    }
}

fn to_position_view(sample: &PositionSample) -> PositionView {
    PositionView {
        timestamp_ms: sample.timestamp.timestamp_millis(),
        latitude: sample.latitude,
        longitude: sample.longitude,
        altitude: sample.altitude,
        velocity: sample.velocity,
    }
}

fn track_status_label(status: TrackStatus) -> &'static str {
    match status {
        TrackStatus::Unknown => "unknown",
        TrackStatus::Waiting => "waiting",
        TrackStatus::Tracking { .. } => "tracking",
    }
}
