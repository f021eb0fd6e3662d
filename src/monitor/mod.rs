//! Monitoring session
//!
//! Orchestrates the whole capture pipeline for one operator session: stream
//! acquisition, continuous rolling recorders, manual and impact triggers,
//! and clip publication. A `Monitor` is an owned context; independent
//! monitors do not share state.

use crate::capture::{
    CaptureState, RollingBuffer, ShotCapture, ShotInput, ShotOutcome, TriggerReason,
};
use crate::impact::{AudioLevelProbe, DetectorState, ImpactConfig, ImpactDetector, TriggerHook};
use crate::replay::{PlaybackSurface, ReplayController};
use crate::source::{
    default_codec_priority, MediaSource, RecorderFactory, Segment, SegmentRecorder, Side, Stream,
    StreamConstraints,
};
use crate::utils::error::{AppError, AppResult};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Where a side's frames come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceSelection {
    /// Open a local camera with these constraints
    Device(StreamConstraints),
    /// Use an already-established remote stream (from a pairing session)
    Remote(Stream),
}

/// Configuration for one monitoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Primary side, always required
    pub side_a: SourceSelection,

    /// Optional secondary side
    pub side_b: Option<SourceSelection>,

    /// Pre-roll retention window in milliseconds
    pub pre_roll_ms: u64,

    /// Post-roll recording duration in milliseconds
    pub post_roll_ms: u64,

    /// Recorder segment cadence in milliseconds
    pub slice_interval_ms: u64,

    /// Impact detector tuning
    pub impact: ImpactConfig,

    /// Encoding formats probed in order
    pub codec_priority: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            side_a: SourceSelection::Device(StreamConstraints::default()),
            side_b: None,
            pre_roll_ms: 5_000,
            post_roll_ms: 3_000,
            slice_interval_ms: 200,
            impact: ImpactConfig::default(),
            codec_priority: default_codec_priority(),
        }
    }
}

impl MonitorConfig {
    pub fn pre_roll(&self) -> Duration {
        Duration::from_millis(self.pre_roll_ms)
    }

    pub fn post_roll(&self) -> Duration {
        Duration::from_millis(self.post_roll_ms)
    }

    pub fn slice_interval(&self) -> Duration {
        Duration::from_millis(self.slice_interval_ms)
    }
}

/// Events emitted during a monitoring session
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    /// Monitoring started
    Started,
    /// Monitoring stopped
    Stopped,
    /// Impact trigger armed
    ImpactArmed,
    /// Impact trigger disarmed
    ImpactDisarmed,
    /// A side's clip finalized and was published for replay
    ShotCaptured {
        side: Side,
        byte_len: usize,
        reason: TriggerReason,
    },
    /// A side's capture failed; any prior clip for it is retained
    CaptureFailed { side: Side, code: String },
    /// Human-readable status line
    Status { message: String },
}

/// One active side: its stream, rolling buffer, and continuous recorder.
struct ActiveSide {
    stream: Stream,
    /// Whether the stream was acquired here (remote streams are not released)
    owned: bool,
    buffer: Arc<RwLock<RollingBuffer>>,
    recorder: Box<dyn SegmentRecorder>,
    pump: JoinHandle<()>,
}

struct MonitorInner {
    media: Arc<dyn MediaSource>,
    factory: Arc<dyn RecorderFactory>,
    config: MonitorConfig,
    replay: ReplayController,
    detector: ImpactDetector,
    busy: Arc<AtomicBool>,
    running: AtomicBool,
    mime: RwLock<Option<String>>,
    sides: Mutex<[Option<ActiveSide>; 2]>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

/// Cheaply cloneable handle to one monitoring session.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    pub fn new(
        media: Arc<dyn MediaSource>,
        factory: Arc<dyn RecorderFactory>,
        audio: Arc<dyn AudioLevelProbe>,
        surface: Arc<dyn PlaybackSurface>,
        config: MonitorConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let busy = Arc::new(AtomicBool::new(false));
        Self {
            inner: Arc::new(MonitorInner {
                media,
                factory,
                config,
                replay: ReplayController::new(surface),
                detector: ImpactDetector::new(audio, busy.clone()),
                busy,
                running: AtomicBool::new(false),
                mime: RwLock::new(None),
                sides: Mutex::new([None, None]),
                event_tx,
            }),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn capture_state(&self) -> CaptureState {
        if self.inner.busy.load(Ordering::Acquire) {
            CaptureState::Capturing
        } else {
            CaptureState::Idle
        }
    }

    pub fn detector_state(&self) -> DetectorState {
        self.inner.detector.state()
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Finished clips and playback control
    pub fn replay(&self) -> &ReplayController {
        &self.inner.replay
    }

    /// Current pre-roll depth for a side, in segments.
    pub fn pre_roll_segments(&self, side: Side) -> usize {
        let sides = self.inner.sides.lock();
        sides[side_index(side)]
            .as_ref()
            .map(|active| active.buffer.read().len())
            .unwrap_or(0)
    }

    fn emit(&self, event: MonitorEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.emit(MonitorEvent::Status { message });
    }

    /// Acquire streams and start the continuous rolling recorders.
    ///
    /// Primary acquisition failure aborts the start; a missing secondary is
    /// reported and monitoring continues on the primary alone.
    pub async fn start_monitoring(&self) -> AppResult<()> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            self.status("monitor already active");
            return Ok(());
        }

        let config = &self.inner.config;
        let Some(mime) = self
            .inner
            .factory
            .choose_supported(&config.codec_priority)
        else {
            self.inner.running.store(false, Ordering::Release);
            let err = AppError::RecorderUnsupported(config.codec_priority.join(", "));
            self.status(err.to_string());
            return Err(err);
        };
        *self.inner.mime.write() = Some(mime.clone());

        // Side A comes up completely before side B is touched, so a primary
        // failure never leaves a half-acquired secondary behind.
        let active_a = match self.bring_up_side(Side::A, &config.side_a, &mime).await {
            Ok(active) => active,
            Err(err) => {
                self.inner.running.store(false, Ordering::Release);
                self.status(format!("failed to start monitor ({err})"));
                return Err(err);
            }
        };

        let active_b = match &config.side_b {
            Some(selection) => match self.bring_up_side(Side::B, selection, &mime).await {
                Ok(active) => Some(active),
                Err(err) => {
                    tracing::warn!(error = %err, "side B unavailable, continuing with side A only");
                    self.status(format!("side B unavailable ({err}), monitoring side A only"));
                    None
                }
            },
            None => None,
        };

        let dual = active_b.is_some();
        {
            let mut sides = self.inner.sides.lock();
            sides[0] = Some(active_a);
            sides[1] = active_b;
        }

        self.emit(MonitorEvent::Started);
        if dual {
            self.status("dual monitor active");
        } else {
            self.status("monitor active (side A only)");
        }
        Ok(())
    }

    async fn bring_up_side(
        &self,
        side: Side,
        selection: &SourceSelection,
        mime: &str,
    ) -> AppResult<ActiveSide> {
        let (stream, owned) = match selection {
            SourceSelection::Device(constraints) => {
                let stream = self
                    .inner
                    .media
                    .acquire(constraints)
                    .await
                    .map_err(|e| AppError::DeviceUnavailable(e.to_string()))?;
                (stream, true)
            }
            SourceSelection::Remote(stream) => (stream.clone(), false),
        };
        self.start_rolling(side, stream, owned, mime).await
    }

    async fn start_rolling(
        &self,
        side: Side,
        stream: Stream,
        owned: bool,
        mime: &str,
    ) -> AppResult<ActiveSide> {
        let config = &self.inner.config;
        let buffer = Arc::new(RwLock::new(RollingBuffer::new(config.pre_roll())));

        let mut recorder = self.inner.factory.open(&stream, mime);
        let rx = match recorder.start(config.slice_interval()).await {
            Ok(rx) => rx,
            Err(err) => {
                if owned {
                    self.inner.media.release(&stream).await;
                }
                return Err(AppError::Recording(err.to_string()));
            }
        };

        let pump = spawn_pump(rx, buffer.clone());
        tracing::debug!(%side, stream = %stream.id, "rolling recorder started");

        Ok(ActiveSide {
            stream,
            owned,
            buffer,
            recorder,
            pump,
        })
    }

    /// Trigger a shot capture across every active side.
    ///
    /// Re-entrant triggers (manual or impact) are silently ignored while a
    /// capture session is in progress.
    pub async fn trigger_shot(&self, reason: TriggerReason) -> AppResult<ShotOutcome> {
        if !self.is_monitoring() {
            self.status("start monitoring before recording a shot");
            return Ok(ShotOutcome::NoStream);
        }

        let inputs: Vec<ShotInput> = {
            let sides = self.inner.sides.lock();
            [Side::A, Side::B]
                .into_iter()
                .filter_map(|side| {
                    sides[side_index(side)].as_ref().map(|active| ShotInput {
                        side,
                        stream: active.stream.clone(),
                        buffer: active.buffer.clone(),
                    })
                })
                .collect()
        };

        let mime = self
            .inner
            .mime
            .read()
            .clone()
            .ok_or_else(|| AppError::SessionState("monitor has no active format".to_string()))?;

        let config = &self.inner.config;
        let shot = ShotCapture::new(
            self.inner.factory.clone(),
            self.inner.busy.clone(),
            mime,
            config.post_roll(),
            config.slice_interval(),
        );

        let outcome = shot.trigger(inputs, reason).await;
        match &outcome {
            ShotOutcome::Completed { clips, failures } => {
                for (side, err) in failures {
                    self.emit(MonitorEvent::CaptureFailed {
                        side: *side,
                        code: err.code().to_string(),
                    });
                    self.status(format!("capture failed on side {side} ({err})"));
                }
                let captured = !clips.is_empty();
                for clip in clips.iter().cloned() {
                    self.emit(MonitorEvent::ShotCaptured {
                        side: clip.side,
                        byte_len: clip.byte_len,
                        reason: clip.trigger,
                    });
                    self.inner.replay.load(clip);
                }
                if captured {
                    self.status("shot captured and ready for replay");
                }
            }
            ShotOutcome::Busy => {}
            ShotOutcome::NoStream => {
                self.status("no active stream to record");
            }
        }
        Ok(outcome)
    }

    /// Arm the audio impact trigger.
    pub async fn enable_impact(&self) -> AppResult<()> {
        if !self.is_monitoring() {
            return Err(AppError::SessionState(
                "start monitoring before arming the impact trigger".to_string(),
            ));
        }
        if self.inner.detector.state() == DetectorState::Listening {
            return Ok(());
        }

        let monitor = self.clone();
        let hook: TriggerHook = Arc::new(move || {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                let _ = monitor.trigger_shot(TriggerReason::Impact).await;
            });
        });

        self.inner
            .detector
            .enable(self.inner.config.impact.clone(), hook)
            .await?;
        self.emit(MonitorEvent::ImpactArmed);
        self.status("impact trigger listening");
        Ok(())
    }

    /// Disarm the audio impact trigger. Idempotent.
    pub async fn disable_impact(&self) {
        if self.inner.detector.state() == DetectorState::Disabled {
            return;
        }
        self.inner.detector.disable().await;
        self.emit(MonitorEvent::ImpactDisarmed);
        self.status("impact trigger disabled");
    }

    /// Stop monitoring: disarm the detector, drain the rolling recorders,
    /// and release every owned stream. Idempotent.
    pub async fn stop_monitoring(&self) -> AppResult<()> {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        // Detector first, so no impact trigger lands mid-teardown.
        self.inner.detector.disable().await;

        // An in-flight shot still owns dedicated recorders on these streams;
        // wait for the capture gate to clear before tearing anything down.
        while self.inner.busy.load(Ordering::Acquire) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let taken: Vec<ActiveSide> = {
            let mut sides = self.inner.sides.lock();
            sides.iter_mut().filter_map(Option::take).collect()
        };

        for mut active in taken {
            if let Err(err) = active.recorder.stop().await {
                tracing::warn!(stream = %active.stream.id, error = %err, "rolling recorder stop failed");
            }
            // The pump exits once the recorder's final flush has drained.
            let _ = active.pump.await;
            if active.owned {
                self.inner.media.release(&active.stream).await;
            }
        }

        *self.inner.mime.write() = None;
        self.emit(MonitorEvent::Stopped);
        self.status("monitor stopped");
        Ok(())
    }
}

fn side_index(side: Side) -> usize {
    match side {
        Side::A => 0,
        Side::B => 1,
    }
}

fn spawn_pump(
    mut rx: mpsc::UnboundedReceiver<Segment>,
    buffer: Arc<RwLock<RollingBuffer>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(segment) = rx.recv().await {
            buffer.write().append(segment);
        }
    })
}
