use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    dataset::{DatasetStore, Sample, TrajectoryId},
    error::{TelemetryError, TelemetryResult},
    settings::EngineSettings,
};

use super::{
    buffer::SlidingBuffer,
    event_log::{EventLog, LogEntry, Severity},
    export::{self, ReportContext},
    metrics::{self, MetricsSnapshot},
    noise,
    replay,
    state::{SessionState, StreamPhase, ViewMode},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Emitted,
    /// Streaming but paused; the cursor holds.
    Held,
    Completed,
    /// Not streaming; the caller's timer should stop.
    Inactive,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub session: SessionState,
    pub unit_name: String,
    pub buffered: usize,
    pub visible: Vec<Sample>,
    pub metrics: MetricsSnapshot,
    pub log: Vec<LogEntry>,
}

/// Synchronous replay core. Owns the session and every buffer derived from it;
/// the async controller serializes access and supplies the clock.
pub struct TelemetryEngine {
    dataset: DatasetStore,
    settings: EngineSettings,
    state: SessionState,
    buffer: SlidingBuffer,
    log: EventLog,
    rng: Box<dyn RngCore + Send>,
    /// Intensity to restore when the pending stress test ends, keyed by its generation.
    stress_restore: Option<(u64, f64)>,
    stress_generation: u64,
}

impl TelemetryEngine {
    pub fn new(dataset: DatasetStore, settings: EngineSettings) -> Self {
        Self::with_rng(dataset, settings, Box::new(StdRng::from_entropy()))
    }

    pub fn with_rng(
        dataset: DatasetStore,
        settings: EngineSettings,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        let state = SessionState::new(
            dataset.first_id(),
            noise::clamp_intensity(settings.default_noise_intensity),
        );
        let mut log = EventLog::with_capacity(settings.log_capacity);
        log.append("System Ready.", Severity::Info);

        Self {
            buffer: SlidingBuffer::with_capacity(settings.buffer_capacity),
            dataset,
            settings,
            state,
            log,
            rng,
            stress_restore: None,
            stress_generation: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn buffer(&self) -> &SlidingBuffer {
        &self.buffer
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn dataset(&self) -> &DatasetStore {
        &self.dataset
    }

    pub fn unit_name(&self) -> &str {
        self.dataset
            .get(self.state.selected_trajectory_id)
            .map(|t| t.name.as_str())
            .unwrap_or_default()
    }

    /// Starts streaming the selected trajectory from its first sample.
    pub fn start(&mut self) -> TelemetryResult<()> {
        if self.state.phase.is_active() {
            return Err(TelemetryError::AlreadyStreaming);
        }

        let id = self.state.selected_trajectory_id;
        let name = match self.dataset.playable(id) {
            Some(trajectory) => trajectory.name.clone(),
            None => {
                self.log
                    .append(format!("UPLINK FAILED: no telemetry for {id}"), Severity::Warn);
                return Err(TelemetryError::InvalidSelection { id });
            }
        };

        self.buffer.clear();
        self.state
            .begin_stream(Uuid::new_v4().to_string(), Utc::now());
        self.log
            .append(format!("UPLINK ESTABLISHED: {name}"), Severity::Notice);
        Ok(())
    }

    /// Connecting -> Streaming. Returns false if the stream was reset meanwhile.
    pub fn connect(&mut self) -> bool {
        if self.state.phase != StreamPhase::Connecting {
            return false;
        }
        self.state.phase = StreamPhase::Streaming;
        true
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.state.phase != StreamPhase::Streaming {
            return TickOutcome::Inactive;
        }
        if !self.state.should_emit() {
            return TickOutcome::Held;
        }

        let cursor = self.state.cursor;
        let point = match self.dataset.get(self.state.selected_trajectory_id) {
            // The final recorded sample is never emitted.
            Some(trajectory) if cursor + 1 < trajectory.samples.len() => {
                trajectory.samples[cursor].clone()
            }
            _ => {
                self.state.complete();
                self.log.append("TRAJECTORY COMPLETE.", Severity::Notice);
                return TickOutcome::Completed;
            }
        };

        let live_point = noise::inject(&point, self.state.noise_intensity, &mut self.rng);
        self.buffer.append(live_point);

        let drift = metrics::drift(&point);
        if drift > self.settings.alert_drift_threshold
            && self.rng.gen::<f64>() < self.settings.alert_probability
        {
            self.log.append(
                format!("LSTM CORRECTION: Drift at {drift:.2} m"),
                Severity::Warn,
            );
        }

        self.state.cursor += 1;
        TickOutcome::Emitted
    }

    /// Returns to idle and empties the buffer. Safe to call in any phase.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state.reset();
        if let Some((_, previous)) = self.stress_restore.take() {
            self.state.noise_intensity = previous;
        }
        self.log.append("System Reset.", Severity::Info);
    }

    /// Switching units stops any running stream first.
    pub fn select_trajectory(&mut self, id: TrajectoryId) -> TelemetryResult<()> {
        if self.dataset.get(id).is_none() {
            self.log
                .append(format!("UNKNOWN UNIT: {id}"), Severity::Warn);
            return Err(TelemetryError::InvalidSelection { id });
        }

        if self.state.phase != StreamPhase::Idle || !self.buffer.is_empty() {
            self.reset();
        }
        self.state.selected_trajectory_id = id;
        Ok(())
    }

    /// Takes effect on the next emitted sample. Returns the value actually applied.
    pub fn set_noise_intensity(&mut self, intensity: f64) -> f64 {
        if intensity.is_finite() {
            self.state.noise_intensity = noise::clamp_intensity(intensity);
        }
        self.state.noise_intensity
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.state.view_mode = mode;
    }

    pub fn set_show_noise(&mut self, show: bool) {
        self.state.show_noise = show;
    }

    /// Any scrub request pauses the stream; `None` returns to the live tail.
    pub fn set_scrub(&mut self, index: Option<usize>) {
        match index {
            Some(_) => {
                self.state.is_live = false;
                self.state.scrub_index = replay::clamp_scrub(index, self.buffer.len());
            }
            None => self.resume(),
        }
    }

    pub fn pause(&mut self) {
        self.state.is_live = false;
    }

    pub fn resume(&mut self) {
        self.state.scrub_index = None;
        self.state.is_live = self.state.phase.is_active();
    }

    /// Returns the generation to hand back to [`TelemetryEngine::end_stress_test`],
    /// or `None` if a stress test is already pending.
    pub fn begin_stress_test(&mut self) -> Option<u64> {
        if self.stress_restore.is_some() {
            return None;
        }
        self.stress_generation += 1;
        self.stress_restore = Some((self.stress_generation, self.state.noise_intensity));
        self.state.noise_intensity = noise::clamp_intensity(self.settings.stress_intensity);
        self.log
            .append("WARNING: STRESS TEST INITIATED", Severity::Warn);
        Some(self.stress_generation)
    }

    pub fn end_stress_test(&mut self, generation: u64) -> bool {
        match self.stress_restore {
            Some((pending, previous)) if pending == generation => {
                self.stress_restore = None;
                self.state.noise_intensity = previous;
                self.log
                    .append("STRESS TEST COMPLETE. Stabilizing...", Severity::Info);
                true
            }
            _ => false,
        }
    }

    pub fn visible(&self) -> Vec<Sample> {
        replay::visible_slice(&self.buffer, self.state.scrub_index)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::derive(&self.visible())
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let visible = self.visible();
        EngineSnapshot {
            session: self.state.clone(),
            unit_name: self.unit_name().to_string(),
            buffered: self.buffer.len(),
            metrics: MetricsSnapshot::derive(&visible),
            visible,
            log: self.log.entries(),
        }
    }

    /// CSV of the whole buffer, independent of any scrub.
    pub fn export_csv(&mut self) -> String {
        let payload = export::export_csv(&self.buffer.to_vec());
        self.log.append("Telemetry Exported CSV", Severity::Notice);
        payload
    }

    pub fn report(&self, generated_at: DateTime<Utc>) -> String {
        let buffer = self.buffer.to_vec();
        let log = self.log.entries();
        export::export_report(&ReportContext {
            unit_name: self.unit_name(),
            session: &self.state,
            buffer: &buffer,
            log: &log,
            generated_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Returns the same word forever: 0 makes every draw 0.0, `u64::MAX` makes it ~1.0.
    pub(crate) struct FixedRng(pub u64);

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            self.0 as u32
        }

        fn next_u64(&mut self) -> u64 {
            self.0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(self.0 as u8);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    pub(crate) fn point(time: &str, truth: (f64, f64), pred: (f64, f64)) -> Sample {
        Sample {
            time: time.into(),
            truth_x: truth.0,
            truth_y: truth.1,
            pred_x: pred.0,
            pred_y: pred.1,
            noisy_x: None,
            noisy_y: None,
        }
    }

    pub(crate) fn three_point_dataset() -> DatasetStore {
        DatasetStore::new(vec![(
            "Unit-01".into(),
            vec![
                point("t0", (0.0, 0.0), (0.0, 0.0)),
                point("t1", (1.0, 1.0), (0.5, 0.5)),
                point("t2", (2.0, 2.0), (3.0, 1.0)),
            ],
        )])
    }

    pub(crate) fn linear_dataset(len: usize, drift: f64) -> DatasetStore {
        let samples = (0..len)
            .map(|i| point(&i.to_string(), (i as f64, 0.0), (i as f64 + drift, 0.0)))
            .collect();
        DatasetStore::new(vec![("Unit-01".into(), samples), ("Unit-02".into(), Vec::new())])
    }

    fn engine(dataset: DatasetStore, rng_word: u64) -> TelemetryEngine {
        let settings = EngineSettings {
            default_noise_intensity: 0.0,
            ..EngineSettings::default()
        };
        TelemetryEngine::with_rng(dataset, settings, Box::new(FixedRng(rng_word)))
    }

    fn run_to_completion(engine: &mut TelemetryEngine) -> usize {
        let mut emitted = 0;
        loop {
            match engine.tick() {
                TickOutcome::Emitted => emitted += 1,
                TickOutcome::Completed | TickOutcome::Inactive => return emitted,
                TickOutcome::Held => panic!("stream paused unexpectedly"),
            }
        }
    }

    #[test]
    fn starts_idle_with_ready_entry() {
        let engine = engine(three_point_dataset(), 0);
        assert_eq!(engine.state().phase, StreamPhase::Idle);
        assert!(!engine.state().is_live);
        assert_eq!(engine.log().latest().unwrap().message, "System Ready.");
    }

    #[test]
    fn three_sample_trajectory_emits_all_but_last() {
        let mut engine = engine(three_point_dataset(), u64::MAX);
        engine.start().unwrap();
        assert_eq!(engine.state().phase, StreamPhase::Connecting);
        assert!(engine.connect());

        assert_eq!(run_to_completion(&mut engine), 2);
        assert_eq!(engine.state().phase, StreamPhase::Completed);
        assert!(!engine.state().is_live);
        assert_eq!(engine.buffer().len(), 2);

        let metrics = engine.metrics();
        assert_eq!(metrics.drift, 0.5);
        assert_eq!(metrics.confidence, 92.5);
        assert_eq!(engine.log().latest().unwrap().message, "TRAJECTORY COMPLETE.");

        // Zero intensity leaves the ground-truth channels as the noisy reading.
        let last = engine.buffer().iter().last().unwrap();
        assert_eq!(last.noisy_x, Some(1.0));
        assert_eq!(last.noisy_y, Some(1.0));
    }

    #[test]
    fn start_while_active_is_rejected_without_side_effects() {
        let mut engine = engine(linear_dataset(10, 0.0), 0);
        engine.start().unwrap();
        engine.connect();
        engine.tick();
        engine.tick();
        let before = engine.state().clone();

        assert_eq!(engine.start(), Err(TelemetryError::AlreadyStreaming));
        assert_eq!(engine.state(), &before);
        assert_eq!(engine.buffer().len(), 2);
    }

    #[test]
    fn empty_trajectory_is_invalid_selection() {
        let mut engine = engine(linear_dataset(5, 0.0), 0);
        engine.select_trajectory(TrajectoryId(1)).unwrap();
        let before = engine.state().clone();

        assert_eq!(
            engine.start(),
            Err(TelemetryError::InvalidSelection { id: TrajectoryId(1) })
        );
        assert_eq!(engine.state(), &before);
        assert_eq!(engine.log().latest().unwrap().severity, Severity::Warn);
    }

    #[test]
    fn placeholder_dataset_cannot_start() {
        let mut engine = engine(DatasetStore::empty(), 0);
        assert!(matches!(
            engine.start(),
            Err(TelemetryError::InvalidSelection { .. })
        ));
        assert_eq!(engine.state().phase, StreamPhase::Idle);
    }

    #[test]
    fn unknown_trajectory_leaves_selection_unchanged() {
        let mut engine = engine(linear_dataset(5, 0.0), 0);
        assert!(engine.select_trajectory(TrajectoryId(9)).is_err());
        assert_eq!(engine.state().selected_trajectory_id, TrajectoryId(0));
    }

    #[test]
    fn reset_is_idempotent() {
        let mut engine = engine(linear_dataset(10, 0.0), 0);
        engine.start().unwrap();
        engine.connect();
        for _ in 0..4 {
            engine.tick();
        }

        engine.reset();
        let once = engine.state().clone();
        engine.reset();

        assert_eq!(engine.state(), &once);
        assert_eq!(once.phase, StreamPhase::Idle);
        assert_eq!(once.cursor, 0);
        assert!(engine.buffer().is_empty());
        assert_eq!(engine.tick(), TickOutcome::Inactive);
    }

    #[test]
    fn switching_trajectory_stops_stream() {
        let mut engine = engine(linear_dataset(10, 0.0), 0);
        engine.start().unwrap();
        engine.connect();
        engine.tick();

        engine.select_trajectory(TrajectoryId(1)).unwrap();
        assert_eq!(engine.state().phase, StreamPhase::Idle);
        assert!(engine.buffer().is_empty());
        assert_eq!(engine.state().selected_trajectory_id, TrajectoryId(1));
    }

    #[test]
    fn scrub_freezes_view_and_pauses() {
        let mut engine = engine(linear_dataset(20, 0.0), 0);
        engine.start().unwrap();
        engine.connect();
        for _ in 0..10 {
            engine.tick();
        }

        engine.set_scrub(Some(4));
        assert!(!engine.state().is_live);
        let times: Vec<_> = engine.visible().into_iter().map(|s| s.time).collect();
        assert_eq!(times, ["0", "1", "2", "3"]);
        assert_eq!(engine.metrics().visible_len, 4);

        assert_eq!(engine.tick(), TickOutcome::Held);
        assert_eq!(engine.buffer().len(), 10);

        engine.set_scrub(None);
        assert!(engine.state().is_live);
        assert_eq!(engine.visible().len(), 10);
        assert_eq!(engine.tick(), TickOutcome::Emitted);
    }

    #[test]
    fn scrub_beyond_buffer_is_clamped() {
        let mut engine = engine(linear_dataset(20, 0.0), 0);
        engine.start().unwrap();
        engine.connect();
        for _ in 0..5 {
            engine.tick();
        }
        engine.set_scrub(Some(500));
        assert_eq!(engine.state().scrub_index, None);
        assert_eq!(engine.visible().len(), 5);
        assert!(!engine.state().is_live);
    }

    #[test]
    fn noise_change_applies_to_next_sample() {
        // Every draw is 0.0, so each jitter is exactly -0.5 * intensity.
        let mut engine = engine(linear_dataset(10, 0.0), 0);
        engine.start().unwrap();
        engine.connect();
        engine.tick();
        assert_eq!(engine.set_noise_intensity(2.0), 2.0);
        engine.tick();

        let noisy: Vec<_> = engine.buffer().iter().map(|s| s.noisy_x.unwrap()).collect();
        assert_eq!(noisy, [0.0, 0.0]);
        let second = engine.buffer().iter().nth(1).unwrap();
        assert_eq!(second.truth_x, 1.0);
        assert_eq!(second.noisy_y, Some(-1.0));
    }

    #[test]
    fn noise_intensity_is_clamped_and_ignores_nan() {
        let mut engine = engine(linear_dataset(3, 0.0), 0);
        assert_eq!(engine.set_noise_intensity(12.0), 5.0);
        assert_eq!(engine.set_noise_intensity(f64::NAN), 5.0);
        assert_eq!(engine.set_noise_intensity(-3.0), 0.0);
    }

    #[test]
    fn high_drift_raises_sampled_alerts() {
        let mut alerting = engine(linear_dataset(4, 3.0), 0);
        alerting.start().unwrap();
        alerting.connect();
        alerting.tick();
        assert_eq!(
            alerting.log().latest().unwrap().message,
            "LSTM CORRECTION: Drift at 3.00 m"
        );

        let mut quiet = engine(linear_dataset(4, 3.0), u64::MAX);
        quiet.start().unwrap();
        quiet.connect();
        quiet.tick();
        assert!(quiet.log().latest().unwrap().message.starts_with("UPLINK"));
    }

    #[test]
    fn stress_test_raises_then_restores_noise() {
        let mut engine = engine(linear_dataset(3, 0.0), 0);
        engine.set_noise_intensity(1.5);

        let generation = engine.begin_stress_test().unwrap();
        assert_eq!(engine.state().noise_intensity, 5.0);
        assert_eq!(engine.begin_stress_test(), None);

        assert!(engine.end_stress_test(generation));
        assert_eq!(engine.state().noise_intensity, 1.5);
        assert!(!engine.end_stress_test(generation));
    }

    #[test]
    fn reset_restores_noise_from_pending_stress_test() {
        let mut engine = engine(linear_dataset(3, 0.0), 0);
        engine.set_noise_intensity(1.0);
        let stale = engine.begin_stress_test().unwrap();
        engine.reset();
        assert_eq!(engine.state().noise_intensity, 1.0);

        let fresh = engine.begin_stress_test().unwrap();
        assert!(!engine.end_stress_test(stale));
        assert_eq!(engine.state().noise_intensity, 5.0);
        assert!(engine.end_stress_test(fresh));
    }

    #[test]
    fn export_logs_and_ignores_scrub() {
        let mut engine = engine(linear_dataset(10, 0.0), 0);
        engine.start().unwrap();
        engine.connect();
        engine.tick();
        engine.tick();
        engine.set_scrub(Some(1));

        let csv = engine.export_csv();
        assert_eq!(csv.lines().count(), 3);
        assert_eq!(engine.log().latest().unwrap().message, "Telemetry Exported CSV");

        let report = engine.report(Utc::now());
        assert!(report.contains("UNIT: Unit-01"));
        assert!(report.contains("STATUS: LIVE"));
    }

    #[test]
    fn event_log_stays_bounded() {
        let mut engine = engine(linear_dataset(3, 0.0), 0);
        for _ in 0..30 {
            engine.reset();
        }
        assert_eq!(engine.log().len(), engine.settings().log_capacity);
    }
}
