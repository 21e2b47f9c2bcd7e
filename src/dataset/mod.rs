pub mod models;

pub use models::{Sample, Trajectory, TrajectoryId};

use anyhow::{Context, Result};
use log::warn;
use std::{fs, path::Path, sync::Arc};

use models::RawDataset;

const PLACEHOLDER_NAME: &str = "NO SIGNAL";

/// Read-only collection of recorded trajectories.
///
/// Never empty: a dataset without trajectories holds a single placeholder with no
/// samples, so selection always resolves but starting a stream on it fails.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    trajectories: Arc<[Trajectory]>,
}

impl DatasetStore {
    pub fn new(trajectories: Vec<(String, Vec<Sample>)>) -> Self {
        let mut trajectories: Vec<Trajectory> = trajectories
            .into_iter()
            .enumerate()
            .map(|(index, (name, samples))| Trajectory {
                id: TrajectoryId(index),
                name,
                samples,
            })
            .collect();

        if trajectories.is_empty() {
            warn!("dataset has no trajectories; substituting placeholder");
            trajectories.push(Trajectory {
                id: TrajectoryId(0),
                name: PLACEHOLDER_NAME.to_string(),
                samples: Vec::new(),
            });
        }

        Self {
            trajectories: trajectories.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let raw: RawDataset =
            serde_json::from_str(contents).context("failed to parse dataset JSON")?;
        Ok(Self::new(
            raw.fleet
                .into_iter()
                .map(|entry| (entry.name, entry.data))
                .collect(),
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset from {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("Invalid dataset in {}", path.display()))
    }

    /// Like [`DatasetStore::from_path`], but falls back to the placeholder dataset.
    pub fn load_or_placeholder(path: &Path) -> Self {
        match Self::from_path(path) {
            Ok(store) => store,
            Err(err) => {
                warn!("{err:#}");
                Self::empty()
            }
        }
    }

    pub fn get(&self, id: TrajectoryId) -> Option<&Trajectory> {
        self.trajectories.get(id.0)
    }

    /// Resolves `id` to a trajectory that can actually be streamed.
    pub fn playable(&self, id: TrajectoryId) -> Option<&Trajectory> {
        self.get(id).filter(|trajectory| !trajectory.is_empty())
    }

    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }

    pub fn first_id(&self) -> TrajectoryId {
        self.trajectories[0].id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLEET: &str = r#"{
        "fleet": [
            { "name": "Unit-01", "data": [
                { "time": 0.1, "truth_x": 1.0, "truth_y": 2.0, "pred_x": 1.5, "pred_y": 2.5, "noisy_x": 0.9 },
                { "time": "00:02", "truth_x": 3.0, "pred_x": 3.0 }
            ] },
            { "name": "Unit-02", "data": [] }
        ]
    }"#;

    #[test]
    fn parses_fleet_entries_in_order() {
        let store = DatasetStore::from_json_str(FLEET).unwrap();
        assert_eq!(store.trajectories().len(), 2);

        let first = store.get(TrajectoryId(0)).unwrap();
        assert_eq!(first.name, "Unit-01");
        assert_eq!(first.samples[0].time, "0.1");
        assert_eq!(first.samples[0].noisy_x, Some(0.9));
        assert_eq!(first.samples[0].noisy_y, None);
        assert_eq!(first.samples[1].time, "00:02");
        assert_eq!(first.samples[1].truth_y, 0.0);
        assert_eq!(first.samples[1].pred_y, 0.0);
    }

    #[test]
    fn empty_trajectories_are_selectable_but_not_playable() {
        let store = DatasetStore::from_json_str(FLEET).unwrap();
        assert!(store.get(TrajectoryId(1)).is_some());
        assert!(store.playable(TrajectoryId(1)).is_none());
        assert!(store.playable(TrajectoryId(0)).is_some());
        assert!(store.get(TrajectoryId(7)).is_none());
    }

    #[test]
    fn missing_fleet_substitutes_placeholder() {
        let store = DatasetStore::from_json_str("{}").unwrap();
        assert_eq!(store.trajectories().len(), 1);
        assert_eq!(store.trajectories()[0].name, PLACEHOLDER_NAME);
        assert!(store.playable(store.first_id()).is_none());
    }

    #[test]
    fn unreadable_file_falls_back_to_placeholder() {
        let store = DatasetStore::load_or_placeholder(Path::new("/nonexistent/fleet.json"));
        assert_eq!(store.trajectories().len(), 1);
        assert!(store.trajectories()[0].is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(DatasetStore::from_json_str("{ fleet: ").is_err());
    }
}
