//! Recorded trajectory data models.
//!
//! A dataset file looks like:
//! ```json
//! { "fleet": [ { "name": "Unit-07", "data": [ { "time": 0.1, "truth_x": 1.0, ... } ] } ] }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default, deserialize_with = "time_label")]
    pub time: String,
    pub truth_x: f64,
    #[serde(default)]
    pub truth_y: f64,
    pub pred_x: f64,
    #[serde(default)]
    pub pred_y: f64,
    /// Raw noisy sensor reading. Synthesized from ground truth when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noisy_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noisy_y: Option<f64>,
}

impl Sample {
    /// The all-zero sample metrics fall back to when nothing is visible.
    pub fn origin() -> Self {
        Self {
            time: String::new(),
            truth_x: 0.0,
            truth_y: 0.0,
            pred_x: 0.0,
            pred_y: 0.0,
            noisy_x: None,
            noisy_y: None,
        }
    }
}

/// Recordings store `time` either as a number of seconds or as a preformatted label.
fn time_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Number(serde_json::Number),
        Text(String),
    }

    Ok(match RawTime::deserialize(deserializer)? {
        RawTime::Number(n) => n.to_string(),
        RawTime::Text(s) => s,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrajectoryId(pub usize);

impl fmt::Display for TrajectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Trajectory {
    pub id: TrajectoryId,
    pub name: String,
    pub samples: Vec<Sample>,
}

impl Trajectory {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// On-disk shape of a single fleet entry.
#[derive(Debug, Deserialize)]
pub(crate) struct RawTrajectory {
    pub name: String,
    #[serde(default)]
    pub data: Vec<Sample>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDataset {
    #[serde(default)]
    pub fleet: Vec<RawTrajectory>,
}
