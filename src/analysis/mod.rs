//! Analysis over stored node history
//!
//! - Magnitude spectrum of a sensor series (vibration by default)

pub mod spectrum;

pub use spectrum::{vibration_spectrum, Spectrum, SpectrumAnalyzer, MIN_SPECTRUM_SAMPLES};
