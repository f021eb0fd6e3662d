//! Audio impact detection
//!
//! Samples microphone energy on a display-refresh-equivalent tick and fires
//! a capture trigger when a decibel-like estimate crosses the configured
//! threshold. Edge-triggered and debounced: a cooldown swallows repeat
//! crossings, and the shared busy flag keeps it off while a capture runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::utils::error::{AppError, AppResult};

/// Crossings inside this window after a trigger are ignored.
pub const IMPACT_COOLDOWN: Duration = Duration::from_millis(1800);

/// Sampling cadence, roughly one display refresh.
pub const DETECTOR_TICK: Duration = Duration::from_millis(16);

/// Floor applied before the log so silence maps to a finite estimate.
const LEVEL_FLOOR: f64 = 1e-4;

/// Detector lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorState {
    Disabled,
    Listening,
}

/// Microphone acquisition contract for the detector.
#[async_trait]
pub trait AudioLevelProbe: Send + Sync {
    /// Acquire the microphone and return a live level probe.
    ///
    /// Errors map to `AppError::DeviceUnavailable` in the core.
    async fn acquire(&self) -> anyhow::Result<Box<dyn LevelProbe>>;
}

/// A live analyser over the acquired audio source.
///
/// Dropping the probe releases the audio source.
pub trait LevelProbe: Send {
    /// Current byte frequency-bin magnitudes (0..=255 per bin).
    fn frequency_bins(&mut self) -> Vec<u8>;
}

/// Decibel-like estimate over byte frequency bins.
///
/// Heuristic, relative units: thresholds are tunable against this scale,
/// not calibrated acoustics.
pub fn estimate_db(bins: &[u8]) -> f64 {
    if bins.is_empty() {
        return 20.0 * LEVEL_FLOOR.log10();
    }
    let average = bins.iter().map(|&b| b as f64).sum::<f64>() / bins.len() as f64;
    20.0 * (average / 255.0).max(LEVEL_FLOOR).log10()
}

/// Tuning for one listening session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactConfig {
    /// Trigger fires when the estimate exceeds this value
    pub threshold_db: f64,

    /// Debounce window in milliseconds
    pub cooldown_ms: u64,

    /// Sampling interval in milliseconds
    pub tick_ms: u64,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            threshold_db: -25.0,
            cooldown_ms: IMPACT_COOLDOWN.as_millis() as u64,
            tick_ms: DETECTOR_TICK.as_millis() as u64,
        }
    }
}

impl ImpactConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Invoked when a crossing passes every guard; expected to kick off a
/// capture without blocking the sampling loop.
pub type TriggerHook = Arc<dyn Fn() + Send + Sync>;

/// Threshold-crossing impact detector.
///
/// `Disabled -> Listening -> Disabled`; disabling is deterministic and
/// idempotent.
pub struct ImpactDetector {
    probe_source: Arc<dyn AudioLevelProbe>,
    busy: Arc<AtomicBool>,
    listening: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ImpactDetector {
    pub fn new(probe_source: Arc<dyn AudioLevelProbe>, busy: Arc<AtomicBool>) -> Self {
        Self {
            probe_source,
            busy,
            listening: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> DetectorState {
        if self.listening.load(Ordering::Acquire) {
            DetectorState::Listening
        } else {
            DetectorState::Disabled
        }
    }

    /// Acquire the audio source and start the sampling loop.
    ///
    /// Enabling an already-listening detector is a no-op.
    pub async fn enable(&self, config: ImpactConfig, on_trigger: TriggerHook) -> AppResult<()> {
        if self.listening.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut probe = match self.probe_source.acquire().await {
            Ok(probe) => probe,
            Err(err) => {
                self.listening.store(false, Ordering::Release);
                return Err(AppError::DeviceUnavailable(format!(
                    "impact trigger unavailable ({err})"
                )));
            }
        };

        let listening = self.listening.clone();
        let busy = self.busy.clone();
        let threshold = config.threshold_db;
        let cooldown = config.cooldown();
        let mut ticker = tokio::time::interval(config.tick());

        let handle = tokio::spawn(async move {
            let mut cooldown_until: Option<Instant> = None;
            loop {
                ticker.tick().await;
                if !listening.load(Ordering::Acquire) {
                    break;
                }

                let estimate = estimate_db(&probe.frequency_bins());
                let now = Instant::now();
                let cooling = cooldown_until.is_some_and(|until| now < until);

                if estimate > threshold && !cooling && !busy.load(Ordering::Acquire) {
                    tracing::info!(estimate, threshold, "impact detected");
                    cooldown_until = Some(now + cooldown);
                    on_trigger();
                }
            }
            // Probe drops here, releasing the audio source.
        });

        *self.task.lock() = Some(handle);
        tracing::info!("impact trigger listening");
        Ok(())
    }

    /// Stop the sampling loop and release the audio source.
    ///
    /// Idempotent: disabling an already-disabled detector is a no-op.
    pub async fn disable(&self) {
        if !self.listening.swap(false, Ordering::AcqRel) {
            return;
        }

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!("impact trigger disabled");
    }
}
