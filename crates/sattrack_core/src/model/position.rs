//! Position samples and per-satellite history.
//!
//! # Responsibility
//! - Hold the position snapshot returned by one poll tick.
//! - Distinguish "no samples yet" from "satellite not present".
//!
//! # Invariants
//! - Sample order is kept exactly as delivered by the remote service.
//! - A present key with an empty sequence means the satellite is waiting for
//!   data; an absent key means the satellite is unknown to this snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One observed coordinate of a satellite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub timestamp: DateTime<Utc>,
    /// Degrees, expected range [-90, 90]. Not validated by the client.
    pub latitude: f64,
    /// Degrees, expected range [-180, 180]. Not validated by the client.
    pub longitude: f64,
    /// Kilometers above the reference ellipsoid, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Kilometers per hour, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
}

/// Render state of one satellite in the live view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// Name is absent from the snapshot.
    Unknown,
    /// Name is present with zero samples.
    Waiting,
    /// Name is present with at least one sample.
    Tracking { samples: usize },
}

/// Mapping from satellite display name to its ordered samples.
///
/// Replaced wholesale on every successful poll tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionHistory {
    entries: BTreeMap<String, Vec<PositionSample>>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the sample sequence of one satellite.
    pub fn insert(&mut self, satellite_name: impl Into<String>, samples: Vec<PositionSample>) {
        self.entries.insert(satellite_name.into(), samples);
    }

    /// Returns samples for `satellite_name`, or `None` when the key is absent.
    pub fn samples(&self, satellite_name: &str) -> Option<&[PositionSample]> {
        self.entries.get(satellite_name).map(Vec::as_slice)
    }

    pub fn contains(&self, satellite_name: &str) -> bool {
        self.entries.contains_key(satellite_name)
    }

    pub fn status(&self, satellite_name: &str) -> TrackStatus {
        match self.entries.get(satellite_name) {
            None => TrackStatus::Unknown,
            Some(samples) if samples.is_empty() => TrackStatus::Waiting,
            Some(samples) => TrackStatus::Tracking {
                samples: samples.len(),
            },
        }
    }

    /// Most recent sample by timestamp, independent of delivery order.
    pub fn latest(&self, satellite_name: &str) -> Option<&PositionSample> {
        self.entries
            .get(satellite_name)?
            .iter()
            .max_by_key(|sample| sample.timestamp)
    }

    pub fn satellite_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PositionSample])> {
        self.entries
            .iter()
            .map(|(name, samples)| (name.as_str(), samples.as_slice()))
    }

    /// Number of satellites present, including those waiting for data.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_samples(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl FromIterator<(String, Vec<PositionSample>)> for PositionHistory {
    fn from_iter<T: IntoIterator<Item = (String, Vec<PositionSample>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
