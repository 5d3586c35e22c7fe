//! Frequency spectrum of a node's sensor history
//!
//! Samples are treated as evenly spaced at `sample_rate`. The series mean is
//! removed before the transform so the DC bin reflects only rounding.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::types::{Sample, Sensor};

/// Fewest samples a spectrum is computed from
pub const MIN_SPECTRUM_SAMPLES: usize = 8;

/// One-sided magnitude spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Bin frequencies, `k * sample_rate / N`
    pub frequencies: Vec<f64>,
    /// Unnormalized magnitudes `|X_k|`
    pub magnitudes: Vec<f64>,
    /// Number of input samples (N)
    pub sample_count: usize,
    /// Frequency step between bins
    pub frequency_resolution: f64,
}

impl Spectrum {
    /// Strongest bin as `(frequency, magnitude)`
    pub fn peak(&self) -> Option<(f64, f64)> {
        let (idx, &mag) = self
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))?;
        Some((self.frequencies[idx], mag))
    }

    /// Number of bins, `N / 2 + 1`
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    /// Whether the spectrum has no bins
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// `(frequency, magnitude)` pairs
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.frequencies
            .iter()
            .zip(&self.magnitudes)
            .map(|(&f, &m)| [f, m])
            .collect()
    }
}

/// Spectrum calculator; keeps FFT plans between calls
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer").finish_non_exhaustive()
    }
}

impl SpectrumAnalyzer {
    /// Create an analyzer
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Spectrum of `samples`, `None` below [`MIN_SPECTRUM_SAMPLES`]
    pub fn compute(&mut self, samples: &[f64], sample_rate: f64) -> Option<Spectrum> {
        let n = samples.len();
        if n < MIN_SPECTRUM_SAMPLES {
            return None;
        }

        let mean = samples.iter().sum::<f64>() / n as f64;
        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .map(|&s| Complex::new(s - mean, 0.0))
            .collect();

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let resolution = sample_rate / n as f64;
        let bins = n / 2 + 1;
        Some(Spectrum {
            frequencies: (0..bins).map(|k| k as f64 * resolution).collect(),
            magnitudes: buffer.iter().take(bins).map(|c| c.norm()).collect(),
            sample_count: n,
            frequency_resolution: resolution,
        })
    }
}

/// Vibration spectrum of a node history, oldest sample first
pub fn vibration_spectrum(history: &[Sample], sample_rate: f64) -> Option<Spectrum> {
    let series: Vec<f64> = history.iter().map(|s| s.value(Sensor::Vib)).collect();
    SpectrumAnalyzer::new().compute(&series, sample_rate)
}
