//! Core data types for the telemetry gateway
//!
//! This module contains the fundamental data structures shared by the codec,
//! parser, scorer, store and persistence layers.
//!
//! # Main Types
//!
//! - [`Sensor`] - The fixed sensor set carried by every reading (temp, vib, sound)
//! - [`SensorReadings`] - One value per sensor
//! - [`Sample`] - A validated reading from one node, immutable once built
//! - [`PersistedReading`] - A sample as stored in the durable log, with its id
//!
//! A [`Sample`] is only ever produced by the parser (or by a producer that
//! then encodes it), so every sample reaching the scorer or the store has a
//! non-empty node id and all three sensor values.

use serde::{Deserialize, Serialize};

/// The sensors carried by every telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensor {
    /// Temperature
    Temp,
    /// Vibration
    Vib,
    /// Sound level
    Sound,
}

impl Sensor {
    /// Number of sensors per sample
    pub const COUNT: usize = 3;

    /// All sensors, in the fixed scoring order
    pub const ALL: [Sensor; Sensor::COUNT] = [Sensor::Temp, Sensor::Vib, Sensor::Sound];

    /// Wire field name
    pub fn key(&self) -> &'static str {
        match self {
            Sensor::Temp => "temp",
            Sensor::Vib => "vib",
            Sensor::Sound => "sound",
        }
    }

    /// Weight of this sensor's z-score in the combined anomaly score.
    /// Vibration dominates.
    pub fn weight(&self) -> f64 {
        match self {
            Sensor::Temp => 0.5,
            Sensor::Vib => 1.5,
            Sensor::Sound => 0.8,
        }
    }

    /// Position of this sensor in [`Sensor::ALL`]
    pub fn index(&self) -> usize {
        match self {
            Sensor::Temp => 0,
            Sensor::Vib => 1,
            Sensor::Sound => 2,
        }
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One value per sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub temp: f64,
    pub vib: f64,
    pub sound: f64,
}

impl SensorReadings {
    /// Create a reading set
    pub fn new(temp: f64, vib: f64, sound: f64) -> Self {
        Self { temp, vib, sound }
    }

    /// Value for a given sensor
    pub fn get(&self, sensor: Sensor) -> f64 {
        match sensor {
            Sensor::Temp => self.temp,
            Sensor::Vib => self.vib,
            Sensor::Sound => self.sound,
        }
    }

    /// Iterate `(sensor, value)` pairs in scoring order
    pub fn iter(&self) -> impl Iterator<Item = (Sensor, f64)> + '_ {
        Sensor::ALL.into_iter().map(move |s| (s, self.get(s)))
    }
}

/// A validated telemetry reading from one node
///
/// Fields are private so that a sample cannot change after construction;
/// the only "mutation" is [`Sample::with_anomaly_score`], which returns a
/// new value.
///
/// Deserializing runs the payload checks in [`crate::parser`], so a
/// `Sample` built through serde is as validated as one from the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "crate::parser::WireSample")]
pub struct Sample {
    node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<f64>,
    #[serde(flatten)]
    readings: SensorReadings,
    #[serde(skip_serializing_if = "Option::is_none")]
    anomaly_score: Option<f64>,
}

impl Sample {
    /// Build a sample. Callers outside the parser are expected to pass a
    /// non-empty node id; the parser enforces it for wire input.
    pub fn new(
        node_id: impl Into<String>,
        timestamp: Option<f64>,
        readings: SensorReadings,
        anomaly_score: Option<f64>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            timestamp,
            readings,
            anomaly_score,
        }
    }

    /// Node that produced this sample
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Seconds since the Unix epoch, as stamped by the producer
    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    /// Sensor values
    pub fn readings(&self) -> &SensorReadings {
        &self.readings
    }

    /// Value for one sensor
    pub fn value(&self, sensor: Sensor) -> f64 {
        self.readings.get(sensor)
    }

    /// Anomaly score, `None` if not yet scored
    pub fn anomaly_score(&self) -> Option<f64> {
        self.anomaly_score
    }

    /// Whether some side (producer or gateway) already scored this sample
    pub fn is_scored(&self) -> bool {
        self.anomaly_score.is_some()
    }

    /// Copy of this sample carrying the given score
    pub fn with_anomaly_score(&self, score: f64) -> Self {
        Self {
            anomaly_score: Some(score),
            ..self.clone()
        }
    }
}

/// A reading as stored in the durable log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedReading {
    /// Monotonically increasing row id
    pub id: i64,
    pub node_id: String,
    pub ts: Option<f64>,
    pub temp: f64,
    pub vib: f64,
    pub sound: f64,
    pub anomaly_score: Option<f64>,
}

impl PersistedReading {
    /// Rebuild the sample this row was written from
    pub fn to_sample(&self) -> Sample {
        Sample::new(
            self.node_id.clone(),
            self.ts,
            SensorReadings::new(self.temp, self.vib, self.sound),
            self.anomaly_score,
        )
    }
}
