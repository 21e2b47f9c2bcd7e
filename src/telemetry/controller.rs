use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::debug;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    dataset::{DatasetStore, TrajectoryId},
    error::{TelemetryError, TelemetryResult},
    settings::EngineSettings,
};

use super::{
    engine::{EngineSnapshot, TelemetryEngine, TickOutcome},
    state::ViewMode,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// The one outstanding playback timer.
struct StreamTimer {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl StreamTimer {
    /// Cancels the timer and waits for the task to wind down.
    async fn release(self) {
        self.cancel_token.cancel();
        self.handle.abort();
        let _ = self.handle.await;
    }
}

/// Drives a [`TelemetryEngine`] on a fixed tick and publishes a snapshot after
/// every state change.
///
/// All engine access goes through one mutex, so a tick never interleaves with an
/// intent. Locks are always taken in the order ticker, stress, engine.
#[derive(Clone)]
pub struct StreamController {
    engine: Arc<Mutex<TelemetryEngine>>,
    ticker: Arc<Mutex<Option<StreamTimer>>>,
    stress: Arc<Mutex<Option<JoinHandle<()>>>>,
    snapshots: Arc<watch::Sender<EngineSnapshot>>,
    tick_interval: Duration,
    connect_delay: Duration,
    stress_duration: Duration,
    heartbeat_every_ticks: u32,
}

impl StreamController {
    pub fn new(dataset: DatasetStore, settings: EngineSettings) -> Self {
        Self::with_engine(TelemetryEngine::new(dataset, settings))
    }

    pub fn with_engine(engine: TelemetryEngine) -> Self {
        let debug_mode = std::env::var("FLUXPOINT_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let settings = engine.settings().clone();
        let (snapshots, _) = watch::channel(engine.snapshot());

        Self {
            engine: Arc::new(Mutex::new(engine)),
            ticker: Arc::new(Mutex::new(None)),
            stress: Arc::new(Mutex::new(None)),
            snapshots: Arc::new(snapshots),
            tick_interval: settings.tick_interval(),
            connect_delay: settings.connect_delay(),
            stress_duration: settings.stress_duration(),
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.engine.lock().await.snapshot()
    }

    /// Starts the selected trajectory. A second start while connecting or
    /// streaming leaves everything untouched.
    pub async fn start(&self) -> TelemetryResult<EngineSnapshot> {
        let mut ticker_guard = self.ticker.lock().await;
        let mut engine = self.engine.lock().await;

        match engine.start() {
            Ok(()) => {}
            Err(TelemetryError::AlreadyStreaming) => {
                debug!("start ignored: stream already active");
                return Ok(engine.snapshot());
            }
            Err(err) => {
                log_warn!("start rejected: {err}");
                publish(&self.snapshots, &engine);
                return Err(err);
            }
        }

        // Any timer left in the slot has already run to completion.
        if let Some(previous) = ticker_guard.take() {
            previous.release().await;
        }
        *ticker_guard = Some(self.spawn_ticker());

        log_info!(
            "stream started for {} (session {})",
            engine.unit_name(),
            engine.state().session_id.as_deref().unwrap_or("-")
        );
        Ok(publish(&self.snapshots, &engine))
    }

    /// Cancels the timer before touching the engine, so no queued tick can
    /// mutate the buffer afterwards.
    pub async fn reset(&self) -> EngineSnapshot {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(timer) = ticker_guard.take() {
            timer.release().await;
        }
        let mut stress_guard = self.stress.lock().await;
        if let Some(handle) = stress_guard.take() {
            handle.abort();
        }

        let mut engine = self.engine.lock().await;
        engine.reset();
        publish(&self.snapshots, &engine)
    }

    pub async fn select_trajectory(&self, id: TrajectoryId) -> TelemetryResult<EngineSnapshot> {
        let mut ticker_guard = self.ticker.lock().await;
        let mut engine = self.engine.lock().await;

        if engine.dataset().get(id).is_some() {
            if let Some(timer) = ticker_guard.take() {
                timer.release().await;
            }
        }

        let result = engine.select_trajectory(id);
        let snapshot = publish(&self.snapshots, &engine);
        result.map(|()| snapshot)
    }

    pub async fn set_noise_intensity(&self, intensity: f64) -> EngineSnapshot {
        self.apply(|engine| {
            engine.set_noise_intensity(intensity);
        })
        .await
    }

    pub async fn set_view_mode(&self, mode: ViewMode) -> EngineSnapshot {
        self.apply(|engine| engine.set_view_mode(mode)).await
    }

    pub async fn set_show_noise(&self, show: bool) -> EngineSnapshot {
        self.apply(|engine| engine.set_show_noise(show)).await
    }

    pub async fn set_scrub(&self, index: Option<usize>) -> EngineSnapshot {
        self.apply(|engine| engine.set_scrub(index)).await
    }

    pub async fn pause(&self) -> EngineSnapshot {
        self.apply(|engine| engine.pause()).await
    }

    pub async fn resume(&self) -> EngineSnapshot {
        self.apply(|engine| engine.resume()).await
    }

    /// Spikes the noise for the configured duration, then restores it.
    pub async fn stress_test(&self) -> EngineSnapshot {
        let mut stress_guard = self.stress.lock().await;
        let mut engine = self.engine.lock().await;

        let Some(generation) = engine.begin_stress_test() else {
            return engine.snapshot();
        };

        if let Some(stale) = stress_guard.take() {
            stale.abort();
        }

        let engine_ref = self.engine.clone();
        let snapshots = self.snapshots.clone();
        let duration = self.stress_duration;
        *stress_guard = Some(tokio::spawn(async move {
            time::sleep(duration).await;
            let mut engine = engine_ref.lock().await;
            if engine.end_stress_test(generation) {
                publish(&snapshots, &engine);
            }
        }));

        publish(&self.snapshots, &engine)
    }

    pub async fn export_csv(&self) -> String {
        let mut engine = self.engine.lock().await;
        let payload = engine.export_csv();
        publish(&self.snapshots, &engine);
        payload
    }

    pub async fn report(&self) -> String {
        self.engine.lock().await.report(Utc::now())
    }

    async fn apply<F>(&self, f: F) -> EngineSnapshot
    where
        F: FnOnce(&mut TelemetryEngine),
    {
        let mut engine = self.engine.lock().await;
        f(&mut *engine);
        publish(&self.snapshots, &engine)
    }

    fn spawn_ticker(&self) -> StreamTimer {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let engine = self.engine.clone();
        let snapshots = self.snapshots.clone();
        let tick_interval = self.tick_interval;
        let connect_delay = self.connect_delay;
        let heartbeat_every = self.heartbeat_every_ticks.max(1);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(connect_delay) => {}
                _ = token.cancelled() => return,
            }

            {
                let mut guard = engine.lock().await;
                if token.is_cancelled() || !guard.connect() {
                    return;
                }
                publish(&snapshots, &guard);
            }

            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; samples start one interval in.
            interval.tick().await;

            let mut ticks: u32 = 0;
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = token.cancelled() => {
                        log_info!("stream ticker cancelled");
                        break;
                    }
                }

                let mut guard = engine.lock().await;
                // A reset may have won the lock while this tick was queued.
                if token.is_cancelled() {
                    break;
                }

                match guard.tick() {
                    TickOutcome::Emitted => {
                        publish(&snapshots, &guard);
                    }
                    TickOutcome::Held => {}
                    TickOutcome::Completed => {
                        publish(&snapshots, &guard);
                        log_info!(
                            "trajectory {} complete after {} samples",
                            guard.unit_name(),
                            guard.state().cursor
                        );
                        break;
                    }
                    TickOutcome::Inactive => break,
                }

                ticks = ticks.wrapping_add(1);
                if ticks % heartbeat_every == 0 {
                    let metrics = guard.metrics();
                    debug!(
                        "heartbeat cursor={} buffered={} drift={:.3} rmse={:.3}",
                        guard.state().cursor,
                        guard.buffer().len(),
                        metrics.drift,
                        metrics.rmse
                    );
                }
            }
        });

        StreamTimer {
            handle,
            cancel_token,
        }
    }
}

fn publish(snapshots: &watch::Sender<EngineSnapshot>, engine: &TelemetryEngine) -> EngineSnapshot {
    let snapshot = engine.snapshot();
    snapshots.send_replace(snapshot.clone());
    snapshot
}
