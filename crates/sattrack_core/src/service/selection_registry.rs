//! Selection Registry: capped satellite selections over the remote service.
//!
//! # Responsibility
//! - Mirror the remote catalog and live selections in a local cache.
//! - Check the selection cap and duplicates before any round trip.
//! - Publish to the Refresh Bus on every mutation that invalidates views.
//!
//! # Invariants
//! - Failed reads never overwrite the cache; previous data stays visible.
//! - A mutation's bus publish happens before the mutation returns, and
//!   after the cache already reflects the mutation.
//! - The remote service is the single arbiter of the cap; the local check
//!   only avoids a round trip and server rejections are reported as
//!   `ConstraintViolated`.

use crate::error::{TrackingError, TrackingResult};
use crate::model::satellite::{Satellite, SatelliteId, Selection, SelectionId};
use crate::remote::{RemoteError, SatelliteService};
use crate::service::position_poller::ActiveSatellites;
use crate::service::refresh_bus::RefreshBus;
use log::{info, warn};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

const CATALOG_UNAVAILABLE: &str = "Failed to load satellites";
const SELECTIONS_UNAVAILABLE: &str = "Failed to load selections";
const SELECT_REJECTED: &str = "Failed to select satellite";
const DESELECT_REJECTED: &str = "Failed to stop tracking";

#[derive(Debug, Default)]
struct RegistryCache {
    catalog: Vec<Satellite>,
    selections: Vec<Selection>,
    catalog_loaded: bool,
    selections_loaded: bool,
}

/// Client-side owner of the selection set.
pub struct SelectionRegistry<S: SatelliteService + ?Sized> {
    service: Arc<S>,
    bus: RefreshBus,
    max_selections: usize,
    defer_resync: bool,
    cache: RwLock<RegistryCache>,
}

impl<S: SatelliteService + ?Sized> SelectionRegistry<S> {
    pub fn new(service: Arc<S>, bus: RefreshBus, max_selections: usize) -> Self {
        Self {
            service,
            bus,
            max_selections,
            defer_resync: false,
            cache: RwLock::new(RegistryCache::default()),
        }
    }

    /// Skips the follow-up selection read after a successful mutation.
    ///
    /// For owners whose bus subscriber reloads the registry on every publish.
    pub fn with_deferred_resync(mut self) -> Self {
        self.defer_resync = true;
        self
    }

    pub fn max_selections(&self) -> usize {
        self.max_selections
    }

    /// Fetches the catalog and replaces the cached copy on success.
    pub async fn list_catalog(&self) -> TrackingResult<Vec<Satellite>> {
        let started_at = Instant::now();
        match self.service.list_catalog().await {
            Ok(catalog) => {
                info!(
                    "event=catalog_load module=registry status=ok count={} duration_ms={}",
                    catalog.len(),
                    started_at.elapsed().as_millis()
                );
                let mut cache = self.write_cache();
                cache.catalog = catalog.clone();
                cache.catalog_loaded = true;
                Ok(catalog)
            }
            Err(err) => {
                warn!(
                    "event=catalog_load module=registry status=error duration_ms={} error_code=service_unavailable error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(TrackingError::ServiceUnavailable(format!(
                    "{CATALOG_UNAVAILABLE}: {err}"
                )))
            }
        }
    }

    /// Fetches live selections and replaces the cached copy on success.
    pub async fn list_selections(&self) -> TrackingResult<Vec<Selection>> {
        let started_at = Instant::now();
        match self.service.list_selections().await {
            Ok(selections) => {
                info!(
                    "event=selections_load module=registry status=ok count={} duration_ms={}",
                    selections.len(),
                    started_at.elapsed().as_millis()
                );
                let mut cache = self.write_cache();
                cache.selections = selections.clone();
                cache.selections_loaded = true;
                Ok(selections)
            }
            Err(err) => {
                warn!(
                    "event=selections_load module=registry status=error duration_ms={} error_code=service_unavailable error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(TrackingError::ServiceUnavailable(format!(
                    "{SELECTIONS_UNAVAILABLE}: {err}"
                )))
            }
        }
    }

    /// Re-fetches catalog and selections independently.
    ///
    /// Returns the first failure after both reads were attempted.
    pub async fn reload(&self) -> TrackingResult<()> {
        let catalog = self.list_catalog().await;
        let selections = self.list_selections().await;
        catalog?;
        selections?;
        Ok(())
    }

    /// Starts tracking `satellite_id`.
    ///
    /// # Errors
    /// - `SelectionLimitExceeded` / `AlreadySelected` from the local cache,
    ///   without a round trip.
    /// - `ConstraintViolated` when the server rejects the request.
    /// - `ServiceUnavailable` on transport/server failure.
    pub async fn select(&self, satellite_id: SatelliteId) -> TrackingResult<Selection> {
        if let Err(err) = self.check_can_select(satellite_id) {
            info!(
                "event=selection_create module=registry status=rejected satellite={} error_code={}",
                satellite_id,
                err.error_code()
            );
            return Err(err);
        }

        let started_at = Instant::now();
        match self.service.create_selection(satellite_id).await {
            Ok(selection) => {
                self.edit_cache(|cache| {
                    cache.selections.retain(|existing| existing.id != selection.id);
                    cache.selections.push(selection.clone());
                });
                let token = self.bus.publish();
                info!(
                    "event=selection_create module=registry status=ok satellite={} selection={} token={} duration_ms={}",
                    satellite_id,
                    selection.id,
                    token,
                    started_at.elapsed().as_millis()
                );
                if !self.defer_resync {
                    self.resync_selections().await;
                }
                Ok(selection)
            }
            Err(err) => {
                let mapped = match err {
                    RemoteError::Rejected { reason, .. } => TrackingError::ConstraintViolated(
                        reason.unwrap_or_else(|| SELECT_REJECTED.to_string()),
                    ),
                    RemoteError::NotFound => {
                        TrackingError::ConstraintViolated(SELECT_REJECTED.to_string())
                    }
                    other => {
                        TrackingError::ServiceUnavailable(format!("{SELECT_REJECTED}: {other}"))
                    }
                };
                warn!(
                    "event=selection_create module=registry status=error satellite={} duration_ms={} error_code={}",
                    satellite_id,
                    started_at.elapsed().as_millis(),
                    mapped.error_code()
                );
                if matches!(mapped, TrackingError::ConstraintViolated(_)) {
                    // Server disagreed with the cache; re-read it before any
                    // view reacts to the publish.
                    self.resync_selections().await;
                    self.bus.publish();
                }
                Err(mapped)
            }
        }
    }

    /// Stops tracking the selection `selection_id`.
    ///
    /// # Errors
    /// - `NotFound` when the selection is not live for the current user.
    /// - `ConstraintViolated` on other rejections.
    /// - `ServiceUnavailable` on transport/server failure.
    pub async fn deselect(&self, selection_id: SelectionId) -> TrackingResult<()> {
        let started_at = Instant::now();
        match self.service.delete_selection(selection_id).await {
            Ok(()) => {
                self.edit_cache(|cache| {
                    cache.selections.retain(|existing| existing.id != selection_id);
                });
                let token = self.bus.publish();
                info!(
                    "event=selection_delete module=registry status=ok selection={} token={} duration_ms={}",
                    selection_id,
                    token,
                    started_at.elapsed().as_millis()
                );
                if !self.defer_resync {
                    self.resync_selections().await;
                }
                Ok(())
            }
            Err(err) => {
                let mapped = match err {
                    RemoteError::NotFound => TrackingError::NotFound(selection_id),
                    RemoteError::Rejected { reason, .. } => TrackingError::ConstraintViolated(
                        reason.unwrap_or_else(|| DESELECT_REJECTED.to_string()),
                    ),
                    other => {
                        TrackingError::ServiceUnavailable(format!("{DESELECT_REJECTED}: {other}"))
                    }
                };
                warn!(
                    "event=selection_delete module=registry status=error selection={} duration_ms={} error_code={}",
                    selection_id,
                    started_at.elapsed().as_millis(),
                    mapped.error_code()
                );
                if matches!(mapped, TrackingError::NotFound(_)) {
                    self.edit_cache(|cache| {
                        cache.selections.retain(|existing| existing.id != selection_id);
                    });
                    self.bus.publish();
                    if !self.defer_resync {
                        self.resync_selections().await;
                    }
                }
                Err(mapped)
            }
        }
    }

    /// Local precondition for `select`; never touches the network.
    pub fn check_can_select(&self, satellite_id: SatelliteId) -> TrackingResult<()> {
        let cache = self.read_cache();
        if cache.selections.len() >= self.max_selections {
            return Err(TrackingError::SelectionLimitExceeded {
                limit: self.max_selections,
            });
        }
        if cache
            .selections
            .iter()
            .any(|selection| selection.satellite_id == satellite_id)
        {
            return Err(TrackingError::AlreadySelected(satellite_id));
        }
        Ok(())
    }

    /// Cached catalog from the last successful `list_catalog`.
    pub fn catalog(&self) -> Vec<Satellite> {
        self.read_cache().catalog.clone()
    }

    /// Cached selections from the last successful refresh or mutation.
    pub fn selections(&self) -> Vec<Selection> {
        self.read_cache().selections.clone()
    }

    pub fn selection_count(&self) -> usize {
        self.read_cache().selections.len()
    }

    pub fn is_selected(&self, satellite_id: SatelliteId) -> bool {
        self.read_cache()
            .selections
            .iter()
            .any(|selection| selection.satellite_id == satellite_id)
    }

    /// Catalog entries not currently selected.
    pub fn available_satellites(&self) -> Vec<Satellite> {
        let cache = self.read_cache();
        cache
            .catalog
            .iter()
            .filter(|satellite| {
                !cache
                    .selections
                    .iter()
                    .any(|selection| selection.satellite_id == satellite.id)
            })
            .cloned()
            .collect()
    }

    /// Whether both catalog and selections were loaded at least once.
    pub fn is_loaded(&self) -> bool {
        let cache = self.read_cache();
        cache.catalog_loaded && cache.selections_loaded
    }

    // Local edit applied before publishing; a later read replaces it.
    fn edit_cache(&self, edit: impl FnOnce(&mut RegistryCache)) {
        edit(&mut self.write_cache());
    }

    async fn resync_selections(&self) {
        if self.list_selections().await.is_err() {
            warn!("event=selections_resync module=registry status=error cache=local_edit");
        }
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, RegistryCache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, RegistryCache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: SatelliteService + ?Sized> ActiveSatellites for SelectionRegistry<S> {
    fn active_satellites(&self) -> Option<Vec<String>> {
        let cache = self.read_cache();
        if !cache.selections_loaded {
            return None;
        }
        Some(
            cache
                .selections
                .iter()
                .map(|selection| selection.satellite_name.clone())
                .collect(),
        )
    }
}
