use serde::{Deserialize, Serialize};

use crate::dataset::Sample;

const CONFIDENCE_PER_METRE: f64 = 15.0;
const ELEVATED_DRIFT: f64 = 2.0;
const CRITICAL_DRIFT: f64 = 4.0;

/// Headline error on the primary axis only.
pub fn drift(sample: &Sample) -> f64 {
    (sample.truth_x - sample.pred_x).abs()
}

/// Root-mean-square Euclidean error between ground truth and reconstruction.
pub fn rmse(slice: &[Sample]) -> f64 {
    if slice.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = slice
        .iter()
        .map(|s| {
            let dx = s.truth_x - s.pred_x;
            let dy = s.truth_y - s.pred_y;
            dx * dx + dy * dy
        })
        .sum();

    (sum_squares / slice.len() as f64).sqrt()
}

pub fn confidence(drift: f64) -> f64 {
    (100.0 - drift * CONFIDENCE_PER_METRE).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DriftLevel {
    Nominal,
    Elevated,
    Critical,
}

impl DriftLevel {
    pub fn classify(drift: f64) -> Self {
        if drift > CRITICAL_DRIFT {
            DriftLevel::Critical
        } else if drift > ELEVATED_DRIFT {
            DriftLevel::Elevated
        } else {
            DriftLevel::Nominal
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub drift: f64,
    pub rmse: f64,
    pub confidence: f64,
    pub level: DriftLevel,
    pub visible_len: usize,
}

impl MetricsSnapshot {
    /// Derives metrics from the visible slice; the newest visible sample is "current".
    pub fn derive(visible: &[Sample]) -> Self {
        let origin = Sample::origin();
        let current = visible.last().unwrap_or(&origin);
        let drift = drift(current);

        Self {
            drift,
            rmse: rmse(visible),
            confidence: confidence(drift),
            level: DriftLevel::classify(drift),
            visible_len: visible.len(),
        }
    }
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self::derive(&[])
    }
}
