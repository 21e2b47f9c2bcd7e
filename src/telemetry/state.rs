use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::TrajectoryId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum StreamPhase {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Completed,
}

impl StreamPhase {
    /// Connecting or streaming; a second `start` is rejected in these phases.
    pub fn is_active(&self) -> bool {
        matches!(self, StreamPhase::Connecting | StreamPhase::Streaming)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamPhase::Idle => "STANDBY",
            StreamPhase::Connecting => "CONNECTING",
            StreamPhase::Streaming => "LIVE",
            StreamPhase::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    #[default]
    Follow,
    Orbit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub selected_trajectory_id: TrajectoryId,
    pub phase: StreamPhase,
    /// False while paused by a scrub, or whenever no stream is running.
    pub is_live: bool,
    pub cursor: usize,
    pub noise_intensity: f64,
    pub view_mode: ViewMode,
    pub show_noise: bool,
    pub scrub_index: Option<usize>,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(selected: TrajectoryId, noise_intensity: f64) -> Self {
        Self {
            selected_trajectory_id: selected,
            phase: StreamPhase::Idle,
            is_live: false,
            cursor: 0,
            noise_intensity,
            view_mode: ViewMode::default(),
            show_noise: true,
            scrub_index: None,
            session_id: None,
            started_at: None,
        }
    }

    pub fn begin_stream(&mut self, session_id: String, started_at: DateTime<Utc>) {
        self.phase = StreamPhase::Connecting;
        self.is_live = true;
        self.cursor = 0;
        self.scrub_index = None;
        self.session_id = Some(session_id);
        self.started_at = Some(started_at);
    }

    pub fn complete(&mut self) {
        self.phase = StreamPhase::Completed;
        self.is_live = false;
    }

    /// Back to idle. Operator controls (selection, noise, view) survive.
    pub fn reset(&mut self) {
        self.phase = StreamPhase::Idle;
        self.is_live = false;
        self.cursor = 0;
        self.scrub_index = None;
        self.session_id = None;
        self.started_at = None;
    }

    /// Streaming and not paused.
    pub fn should_emit(&self) -> bool {
        self.phase == StreamPhase::Streaming && self.is_live
    }
}
