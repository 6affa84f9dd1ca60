//! Core incident types for safewatch.
//!
//! An [`Incident`] is a bounded period of safety tracking for one user. While
//! it exists it accumulates [`LocationSample`]s, ordered by a store-assigned
//! sequence number rather than by the client's own timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle state of a stored incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    /// Started and not yet stopped.
    Active,
    /// Stopped; further location updates are still accepted.
    Stopped,
}

impl std::fmt::Display for IncidentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A stored incident record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Client-supplied, globally unique identifier.
    pub incident_id: String,
    /// Subject that owns this incident.
    pub owner_id: String,
    /// When the incident was (most recently) started.
    pub started_at: DateTime<Utc>,
    /// When the incident was stopped, if it has been.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Derive the lifecycle state from `stopped_at`.
    #[must_use]
    pub fn state(&self) -> IncidentState {
        if self.stopped_at.is_some() {
            IncidentState::Stopped
        } else {
            IncidentState::Active
        }
    }

    /// Whether the incident is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == IncidentState::Active
    }
}

/// A validated location about to be appended to an incident.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Reported accuracy in meters; 0.0 when the client sent none.
    pub accuracy: f64,
    /// Client-supplied timestamp, kept for display only.
    pub ts: String,
}

impl NewLocation {
    /// Build a location, rejecting non-finite coordinates and an empty timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] naming the offending field.
    pub fn new(lat: f64, lon: f64, accuracy: Option<f64>, ts: impl Into<String>) -> Result<Self> {
        if !lat.is_finite() {
            return Err(Error::invalid_field("lat"));
        }
        if !lon.is_finite() {
            return Err(Error::invalid_field("lon"));
        }
        let accuracy = accuracy.unwrap_or(0.0);
        if !accuracy.is_finite() {
            return Err(Error::invalid_field("accuracy"));
        }
        let ts = ts.into();
        if ts.trim().is_empty() {
            return Err(Error::missing_field("timestamp"));
        }
        Ok(Self {
            lat,
            lon,
            accuracy,
            ts,
        })
    }
}

/// A location sample as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Incident this sample belongs to.
    pub incident_id: String,
    /// Store-assigned ordering key.
    pub sequence: i64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Reported accuracy in meters.
    pub accuracy: f64,
    /// Client-supplied timestamp.
    pub ts: String,
}

/// Result of atomically inserting a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedLocation {
    /// Sequence assigned to the new sample.
    pub sequence: i64,
    /// Number of samples stored for the incident, including this one.
    pub count: i64,
}

impl InsertedLocation {
    /// Whether this insert produced the incident's first sample.
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.count == 1
    }
}

/// One row of an incident report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Reported accuracy in meters.
    pub accuracy: f64,
    /// Client-supplied timestamp.
    pub ts: String,
}

impl From<LocationSample> for ReportEntry {
    fn from(sample: LocationSample) -> Self {
        Self {
            lat: sample.lat,
            lon: sample.lon,
            accuracy: sample.accuracy,
            ts: sample.ts,
        }
    }
}

/// All samples of an incident in sequence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Incident the report covers.
    pub incident_id: String,
    /// Samples ordered by store sequence.
    #[serde(rename = "report")]
    pub entries: Vec<ReportEntry>,
}

impl Report {
    /// Assemble a report from samples already ordered by sequence.
    #[must_use]
    pub fn from_samples(incident_id: impl Into<String>, samples: Vec<LocationSample>) -> Self {
        Self {
            incident_id: incident_id.into(),
            entries: samples.into_iter().map(ReportEntry::from).collect(),
        }
    }

    /// Number of entries in the report.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the report has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
