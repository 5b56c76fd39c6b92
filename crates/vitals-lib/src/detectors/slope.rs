//! Slope-threshold check on a uniformly sampled window.
//!
//! The slope of each adjacent pair is `(x[i+1] - x[i]) / (1 / sample_rate)`,
//! in amplitude per second. Timestamps are never consulted: the window is
//! assumed to be sampled at the configured rate without gaps.

use serde::{Deserialize, Serialize};

/// Per-pair slopes of `samples`; empty for fewer than two samples.
pub fn slopes(samples: &[f64], sample_rate: f64) -> impl Iterator<Item = f64> + '_ {
    let period = 1.0 / sample_rate;
    samples.windows(2).map(move |w| (w[1] - w[0]) / period)
}

/// Largest slope magnitude in `samples`, or `0.0` for fewer than two samples.
pub fn calibrate_margin(samples: &[f64], sample_rate: f64) -> f64 {
    slopes(samples, sample_rate)
        .map(f64::abs)
        .fold(0.0, |margin, slope| if slope > margin { slope } else { margin })
}

/// True if any slope magnitude is strictly greater than `margin`.
pub fn detect_anomaly(samples: &[f64], margin: f64, sample_rate: f64) -> bool {
    slopes(samples, sample_rate).any(|slope| slope.abs() > margin)
}

/// Indices `i` of every pair `(i, i + 1)` whose slope magnitude exceeds `margin`.
pub fn anomalous_pairs(samples: &[f64], margin: f64, sample_rate: f64) -> Vec<usize> {
    slopes(samples, sample_rate)
        .enumerate()
        .filter(|(_, slope)| slope.abs() > margin)
        .map(|(i, _)| i)
        .collect()
}

/// Outcome of checking one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAssessment {
    pub margin: f64,
    pub is_anomalous: bool,
}

/// What the dashboard shows for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Anomalous,
    Normal,
    DataUnavailable,
}

impl AssessmentStatus {
    pub fn from_assessment(assessment: &AnomalyAssessment) -> Self {
        if assessment.is_anomalous {
            AssessmentStatus::Anomalous
        } else {
            AssessmentStatus::Normal
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AssessmentStatus::Anomalous => "Possible bradycardia detected",
            AssessmentStatus::Normal => "Everything looks normal",
            AssessmentStatus::DataUnavailable => "Data unavailable",
        }
    }
}

/// Calibration and detection at a fixed deployment sample rate.
#[derive(Debug, Clone, Copy)]
pub struct SlopeDetector {
    pub sample_rate: f64,
}

impl SlopeDetector {
    pub fn new(sample_rate: f64) -> Self {
        Self { sample_rate }
    }

    pub fn calibrate(&self, samples: &[f64]) -> f64 {
        calibrate_margin(samples, self.sample_rate)
    }

    pub fn detect(&self, samples: &[f64], margin: f64) -> bool {
        detect_anomaly(samples, margin, self.sample_rate)
    }

    pub fn locate(&self, samples: &[f64], margin: f64) -> Vec<usize> {
        anomalous_pairs(samples, margin, self.sample_rate)
    }

    /// Check `samples` against `margin`, or against the calibrated margin when none is given.
    pub fn assess(&self, samples: &[f64], margin: Option<f64>) -> AnomalyAssessment {
        let margin = margin.unwrap_or_else(|| self.calibrate(samples));
        AnomalyAssessment {
            margin,
            is_anomalous: self.detect(samples, margin),
        }
    }
}
