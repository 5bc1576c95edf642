// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sample data model and the delivery envelope.
//!
//! A [`Sample`] is one observation produced by a sensor collaborator. The
//! same JSON shape is used for the on-disk queue record and for each element
//! of the [`Envelope`] `data` array, so a record drained from the queue can
//! be shipped without conversion.
//!
//! # Example
//!
//! ```
//! use telemetry_sync::{Sample, Envelope};
//! use chrono::{TimeZone, Utc};
//!
//! let t = Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap();
//! let samples = vec![Sample::vital(t, 1, 72.0)];
//!
//! let json = Envelope::new("device-1", &samples).to_json().unwrap();
//! assert!(json.contains(r#""type":"vital""#));
//! assert!(json.contains(r#""device_id":"device-1""#));
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vital code used for instantaneous ambient noise readings (dB).
pub const AMBIENT_NOISE_DB: i64 = 10;

/// Coarse motion classification attached to location fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionContext {
    Stationary,
    Walking,
    Running,
    Cycling,
    Driving,
    Unknown,
}

/// A health metric reading identified by an integer code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalReading {
    pub t: DateTime<Utc>,
    pub code: i64,
    pub val: f64,
}

/// A location fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub t: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Horizontal accuracy in meters
    pub acc: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion_context: Option<MotionContext>,
}

/// A labeled event with optional text value and string metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub t: DateTime<Utc>,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// One observation. Tagged on the wire by `"type"`.
///
/// Timestamps are not assumed monotonic: collaborators backfill history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Sample {
    #[serde(rename = "vital")]
    Vital(VitalReading),
    #[serde(rename = "gps")]
    Location(LocationFix),
    #[serde(rename = "event")]
    Event(EventRecord),
}

/// Discriminant of a [`Sample`], used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Vital,
    Location,
    Event,
}

impl std::fmt::Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vital => write!(f, "vital"),
            Self::Location => write!(f, "gps"),
            Self::Event => write!(f, "event"),
        }
    }
}

impl Sample {
    pub fn vital(t: DateTime<Utc>, code: i64, val: f64) -> Self {
        Self::Vital(VitalReading { t, code, val })
    }

    pub fn location(t: DateTime<Utc>, lat: f64, lon: f64, acc: f64) -> Self {
        Self::Location(LocationFix {
            t,
            lat,
            lon,
            acc,
            motion_context: None,
        })
    }

    pub fn event(t: DateTime<Utc>, label: impl Into<String>) -> Self {
        Self::Event(EventRecord {
            t,
            label: label.into(),
            val_text: None,
            metadata: None,
        })
    }

    /// Attach a motion context. No effect on non-location samples.
    #[must_use]
    pub fn with_motion_context(mut self, context: MotionContext) -> Self {
        if let Self::Location(ref mut fix) = self {
            fix.motion_context = Some(context);
        }
        self
    }

    /// Attach a text value. No effect on non-event samples.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        if let Self::Event(ref mut event) = self {
            event.val_text = Some(text.into());
        }
        self
    }

    /// Attach string metadata. No effect on non-event samples.
    #[must_use]
    pub fn with_metadata<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        if let Self::Event(ref mut event) = self {
            event.metadata = Some(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            );
        }
        self
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Vital(v) => v.t,
            Self::Location(l) => l.t,
            Self::Event(e) => e.t,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SampleKind {
        match self {
            Self::Vital(_) => SampleKind::Vital,
            Self::Location(_) => SampleKind::Location,
            Self::Event(_) => SampleKind::Event,
        }
    }

    /// First numeric field holding NaN or an infinity.
    ///
    /// JSON has no encoding for these values; serde_json writes them as
    /// `null`, which no longer decodes as a number.
    #[must_use]
    pub fn non_finite_field(&self) -> Option<&'static str> {
        match self {
            Self::Vital(v) if !v.val.is_finite() => Some("val"),
            Self::Location(l) => [("lat", l.lat), ("lon", l.lon), ("acc", l.acc)]
                .into_iter()
                .find(|(_, v)| !v.is_finite())
                .map(|(name, _)| name),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnvelopeMetadata<'a> {
    pub device_id: &'a str,
}

/// Wire wrapper for one delivery attempt. Built fresh per attempt, never stored.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub metadata: EnvelopeMetadata<'a>,
    pub data: &'a [Sample],
}

impl<'a> Envelope<'a> {
    pub fn new(device_id: &'a str, data: &'a [Sample]) -> Self {
        Self {
            metadata: EnvelopeMetadata { device_id },
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
