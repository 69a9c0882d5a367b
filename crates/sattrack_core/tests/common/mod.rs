#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sattrack_core::{
    PositionHistory, PositionSample, RemoteError, RemoteResult, Satellite, SatelliteId,
    SatelliteService, Selection, SelectionId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const SERVER_CAP: usize = 2;

/// In-memory stand-in for the remote tracking API.
///
/// Mirrors server behavior: per-user cap, duplicate rejection, positions
/// keyed by the names of live selections.
#[derive(Default)]
pub struct FakeSatelliteService {
    state: Mutex<FakeState>,
    catalog_calls: AtomicUsize,
    selection_list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    position_calls: AtomicUsize,
    position_gate: Mutex<Option<Arc<Notify>>>,
    selection_gate: Mutex<Option<Arc<Notify>>>,
    yielding_reads: AtomicBool,
}

#[derive(Default)]
struct FakeState {
    catalog: Vec<Satellite>,
    selections: Vec<Selection>,
    next_selection_id: SelectionId,
    samples: HashMap<String, Vec<PositionSample>>,
    fail_catalog: bool,
    fail_selection_list: bool,
    failing_position_calls: HashSet<usize>,
    reject_next_create: Option<Option<String>>,
}

impl FakeSatelliteService {
    pub fn with_catalog(names: &[(SatelliteId, &str)]) -> Arc<Self> {
        let service = Self::default();
        {
            let mut state = service.state.lock().unwrap();
            state.catalog = names
                .iter()
                .map(|(id, name)| Satellite::new(*id, *name))
                .collect();
            state.next_selection_id = 100;
        }
        Arc::new(service)
    }

    /// Creates a selection directly on the "server", bypassing the client.
    pub fn seed_selection(&self, satellite_id: SatelliteId) -> Selection {
        let mut state = self.state.lock().unwrap();
        let selection = state.make_selection(satellite_id);
        state.selections.push(selection.clone());
        selection
    }

    pub fn set_samples(&self, satellite_name: &str, samples: Vec<PositionSample>) {
        self.state
            .lock()
            .unwrap()
            .samples
            .insert(satellite_name.to_string(), samples);
    }

    pub fn fail_catalog(&self, fail: bool) {
        self.state.lock().unwrap().fail_catalog = fail;
    }

    pub fn fail_selection_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_selection_list = fail;
    }

    /// Fails the given 1-based `fetch_positions` call numbers.
    pub fn fail_position_calls(&self, calls: &[usize]) {
        self.state
            .lock()
            .unwrap()
            .failing_position_calls
            .extend(calls.iter().copied());
    }

    pub fn reject_next_create(&self, reason: Option<&str>) {
        self.state.lock().unwrap().reject_next_create = Some(reason.map(str::to_string));
    }

    /// Holds every `fetch_positions` call until `gate` is notified.
    pub fn hold_positions(&self, gate: Arc<Notify>) {
        *self.position_gate.lock().unwrap() = Some(gate);
    }

    /// Holds every `list_selections` call until `gate` is notified.
    pub fn hold_selections(&self, gate: Arc<Notify>) {
        *self.selection_gate.lock().unwrap() = Some(gate);
    }

    /// Makes catalog and selection reads yield once, like a real round trip.
    pub fn yield_on_reads(&self) {
        self.yielding_reads.store(true, Ordering::SeqCst);
    }

    async fn read_round_trip(&self) {
        if self.yielding_reads.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    pub fn server_selection_count(&self) -> usize {
        self.state.lock().unwrap().selections.len()
    }

    pub fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    pub fn selection_list_calls(&self) -> usize {
        self.selection_list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn position_calls(&self) -> usize {
        self.position_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.catalog_calls()
            + self.selection_list_calls()
            + self.create_calls()
            + self.delete_calls()
            + self.position_calls()
    }
}

impl FakeState {
    fn make_selection(&mut self, satellite_id: SatelliteId) -> Selection {
        let name = self
            .catalog
            .iter()
            .find(|satellite| satellite.id == satellite_id)
            .map(|satellite| satellite.name.clone())
            .unwrap_or_else(|| format!("SAT-{satellite_id}"));
        self.next_selection_id += 1;
        Selection {
            id: self.next_selection_id,
            satellite_id,
            satellite_name: name,
            selected_at: at_minute(0),
        }
    }
}

#[async_trait]
impl SatelliteService for FakeSatelliteService {
    async fn list_catalog(&self) -> RemoteResult<Vec<Satellite>> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        self.read_round_trip().await;
        let state = self.state.lock().unwrap();
        if state.fail_catalog {
            return Err(RemoteError::Status {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        Ok(state.catalog.clone())
    }

    async fn list_selections(&self) -> RemoteResult<Vec<Selection>> {
        self.selection_list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.selection_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.read_round_trip().await;
        let state = self.state.lock().unwrap();
        if state.fail_selection_list {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        Ok(state.selections.clone())
    }

    async fn create_selection(&self, satellite_id: SatelliteId) -> RemoteResult<Selection> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.reject_next_create.take() {
            return Err(RemoteError::Rejected { status: 400, reason });
        }
        if state.selections.len() >= SERVER_CAP {
            return Err(RemoteError::Rejected {
                status: 400,
                reason: Some(
                    "You can only track 2 satellites at a time. Please deactivate one first."
                        .to_string(),
                ),
            });
        }
        if state
            .selections
            .iter()
            .any(|selection| selection.satellite_id == satellite_id)
        {
            return Err(RemoteError::Rejected {
                status: 400,
                reason: Some("You are already tracking this satellite.".to_string()),
            });
        }
        let selection = state.make_selection(satellite_id);
        state.selections.push(selection.clone());
        Ok(selection)
    }

    async fn delete_selection(&self, selection_id: SelectionId) -> RemoteResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let before = state.selections.len();
        state.selections.retain(|selection| selection.id != selection_id);
        if state.selections.len() == before {
            return Err(RemoteError::NotFound);
        }
        Ok(())
    }

    async fn fetch_positions(&self) -> RemoteResult<PositionHistory> {
        let call = self.position_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = self.position_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let state = self.state.lock().unwrap();
        if state.failing_position_calls.contains(&call) {
            return Err(RemoteError::Transport(format!("timeout on call {call}")));
        }
        Ok(state
            .selections
            .iter()
            .map(|selection| {
                let samples = state
                    .samples
                    .get(&selection.satellite_name)
                    .cloned()
                    .unwrap_or_default();
                (selection.satellite_name.clone(), samples)
            })
            .collect())
    }
}

pub fn at_minute(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0)
        .single()
        .expect("valid fixture timestamp")
}

pub fn sample(minute: u32, latitude: f64, longitude: f64) -> PositionSample {
    PositionSample {
        timestamp: at_minute(minute),
        latitude,
        longitude,
        altitude: None,
        velocity: None,
    }
}

/// Yields until `condition` holds, failing the test after a bounded wait.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Lets spawned tasks drain their ready work.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
