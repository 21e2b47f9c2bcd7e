use serde::{Deserialize, Serialize};

use crate::{dataset::TrajectoryId, error::TelemetryResult};

use super::{controller::StreamController, engine::EngineSnapshot, state::ViewMode};

/// Operator intents, as sent by a dashboard or typed on stdin, one JSON object each:
/// `{"intent":"setNoiseIntensity","value":2.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "camelCase")]
pub enum Intent {
    SelectTrajectory { id: TrajectoryId },
    Start,
    Stop,
    Reset,
    Pause,
    Resume,
    SetNoiseIntensity { value: f64 },
    SetViewMode { mode: ViewMode },
    SetShowNoise { show: bool },
    SetScrub {
        #[serde(default)]
        index: Option<usize>,
    },
    StressTest,
    Export,
    Report,
}

#[derive(Debug, Clone)]
pub enum IntentReply {
    Snapshot(EngineSnapshot),
    Csv(String),
    Report(String),
}

pub async fn dispatch(controller: &StreamController, intent: Intent) -> TelemetryResult<IntentReply> {
    let reply = match intent {
        Intent::SelectTrajectory { id } => IntentReply::Snapshot(controller.select_trajectory(id).await?),
        Intent::Start => IntentReply::Snapshot(controller.start().await?),
        Intent::Stop | Intent::Reset => IntentReply::Snapshot(controller.reset().await),
        Intent::Pause => IntentReply::Snapshot(controller.pause().await),
        Intent::Resume => IntentReply::Snapshot(controller.resume().await),
        Intent::SetNoiseIntensity { value } => {
            IntentReply::Snapshot(controller.set_noise_intensity(value).await)
        }
        Intent::SetViewMode { mode } => IntentReply::Snapshot(controller.set_view_mode(mode).await),
        Intent::SetShowNoise { show } => IntentReply::Snapshot(controller.set_show_noise(show).await),
        Intent::SetScrub { index } => IntentReply::Snapshot(controller.set_scrub(index).await),
        Intent::StressTest => IntentReply::Snapshot(controller.stress_test().await),
        Intent::Export => IntentReply::Csv(controller.export_csv().await),
        Intent::Report => IntentReply::Report(controller.report().await),
    };
    Ok(reply)
}
