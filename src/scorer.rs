//! Online anomaly scorer
//!
//! Each node gets one [`AnomalyScorer`], which keeps one [`RunningStat`]
//! per sensor: an exponentially weighted mean and variance. A sample's
//! anomaly score is the weighted sum of per-sensor absolute z-scores
//! against the statistics as they stood *before* the sample arrived:
//!
//! ```text
//! z_s   = |x_s - mean_s| / sqrt(var_s + VAR_FLOOR)
//! score = round(0.5 * z_temp + 1.5 * z_vib + 0.8 * z_sound, 4)
//! ```
//!
//! Only after scoring are the statistics folded forward:
//!
//! ```text
//! mean' = (1 - alpha) * mean + alpha * x
//! var'  = max((1 - alpha) * var + alpha * (x - mean)^2, VAR_FLOOR)
//! ```
//!
//! Updating first would let every spike partially absorb itself before it
//! is measured.
//!
//! The first value seen for a sensor seeds its mean, sets the variance to
//! [`INITIAL_VARIANCE`] and contributes a z-score of zero.
//!
//! [`AnomalyScorer`] is plain `&mut self` state. [`ScorerRegistry`] owns one
//! scorer per node behind its own lock, so different nodes score in
//! parallel and calls for one node are serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{GatewayError, Result};
use crate::types::{Sample, Sensor, SensorReadings};

/// Default EMA smoothing factor
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Minimum variance, also added under the square root when scoring
pub const VAR_FLOOR: f64 = 1e-6;

/// Variance assigned when a sensor is first seen
pub const INITIAL_VARIANCE: f64 = 1e-4;

/// Running mean/variance for one (node, sensor) pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunningStat {
    mean: f64,
    variance: f64,
    initialized: bool,
}

impl RunningStat {
    /// Current smoothed mean (0 until initialized)
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Current smoothed variance (0 until initialized, then >= VAR_FLOOR)
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Whether a value has been observed. Never reverts once set.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Absolute z-score of `value` against the current statistics.
    /// An uninitialized stat scores everything as 0.
    pub fn z_score(&self, value: f64) -> f64 {
        if !self.initialized {
            return 0.0;
        }
        let std = (self.variance + VAR_FLOOR).sqrt();
        (value - self.mean).abs() / std
    }

    fn seed(&mut self, value: f64) {
        self.mean = value;
        self.variance = INITIAL_VARIANCE;
        self.initialized = true;
    }

    fn fold(&mut self, value: f64, alpha: f64) {
        let old_mean = self.mean;
        let delta = value - old_mean;
        self.mean = (1.0 - alpha) * old_mean + alpha * value;
        self.variance = ((1.0 - alpha) * self.variance + alpha * delta * delta).max(VAR_FLOOR);
    }
}

/// Per-node scorer holding one [`RunningStat`] per sensor
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    alpha: f64,
    stats: [RunningStat; Sensor::COUNT],
}

impl Default for AnomalyScorer {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            stats: [RunningStat::default(); Sensor::COUNT],
        }
    }
}

impl AnomalyScorer {
    /// Create a scorer with the given smoothing factor, which must lie in (0, 1)
    pub fn new(alpha: f64) -> Result<Self> {
        validate_alpha(alpha)?;
        Ok(Self {
            alpha,
            ..Self::default()
        })
    }

    /// Smoothing factor
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Statistics for one sensor
    pub fn stat(&self, sensor: Sensor) -> &RunningStat {
        &self.stats[sensor.index()]
    }

    /// Score a set of readings, then fold them into the running statistics
    pub fn update_and_score(&mut self, readings: &SensorReadings) -> f64 {
        let mut z_sum = 0.0;
        for (sensor, value) in readings.iter() {
            let stat = &mut self.stats[sensor.index()];
            let z = if stat.initialized {
                stat.z_score(value)
            } else {
                stat.seed(value);
                0.0
            };
            z_sum += sensor.weight() * z;
            stat.fold(value, self.alpha);
        }
        round_score(z_sum)
    }
}

/// Reject smoothing factors outside the open unit interval
pub fn validate_alpha(alpha: f64) -> Result<()> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(GatewayError::Config(format!(
            "alpha must be in (0, 1), got {}",
            alpha
        )))
    }
}

/// Round half away from zero to 4 decimal places
fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// One scorer per node, created on first sight of the node
#[derive(Debug)]
pub struct ScorerRegistry {
    alpha: f64,
    scorers: RwLock<HashMap<String, Arc<Mutex<AnomalyScorer>>>>,
}

impl ScorerRegistry {
    /// Create an empty registry whose scorers use `alpha`
    pub fn new(alpha: f64) -> Result<Self> {
        validate_alpha(alpha)?;
        Ok(Self {
            alpha,
            scorers: RwLock::new(HashMap::new()),
        })
    }

    /// Score a sample with its node's scorer
    pub fn score(&self, sample: &Sample) -> f64 {
        let scorer = self.scorer_for(sample.node_id());
        let mut scorer = scorer.lock().unwrap_or_else(|e| e.into_inner());
        scorer.update_and_score(sample.readings())
    }

    /// Snapshot of one node's statistics for a sensor
    pub fn stat(&self, node_id: &str, sensor: Sensor) -> Option<RunningStat> {
        let scorers = self.scorers.read().unwrap_or_else(|e| e.into_inner());
        let scorer = scorers.get(node_id)?;
        let scorer = scorer.lock().unwrap_or_else(|e| e.into_inner());
        Some(*scorer.stat(sensor))
    }

    /// Number of nodes with a scorer
    pub fn len(&self) -> usize {
        self.scorers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no node has been scored yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn scorer_for(&self, node_id: &str) -> Arc<Mutex<AnomalyScorer>> {
        if let Some(scorer) = self
            .scorers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(node_id)
        {
            return scorer.clone();
        }
        let mut scorers = self.scorers.write().unwrap_or_else(|e| e.into_inner());
        scorers
            .entry(node_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(AnomalyScorer {
                    alpha: self.alpha,
                    ..AnomalyScorer::default()
                }))
            })
            .clone()
    }
}
