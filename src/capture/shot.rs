//! Triggered shot capture
//!
//! Orchestrates one shot: freezes each side's pre-roll, records a bounded
//! post-roll on dedicated recorders, and stitches the two into a single
//! clip per side. Sides record concurrently and fail independently.

use super::buffer::RollingBuffer;
use super::state::{CaptureGate, Clip, TriggerReason};
use crate::source::{RecorderFactory, Segment, Side, Stream};
use crate::utils::error::AppError;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Shortest post-roll we will record, whatever the configured value.
const MIN_POST_ROLL: Duration = Duration::from_secs(1);

/// One side's contribution to a triggered shot.
pub struct ShotInput {
    pub side: Side,
    pub stream: Stream,
    pub buffer: Arc<RwLock<RollingBuffer>>,
}

/// Result of a trigger request.
#[derive(Debug)]
pub enum ShotOutcome {
    /// Another capture session was already in progress; this one was ignored.
    Busy,
    /// No active stream to record from.
    NoStream,
    /// The shot ran; each side succeeded or failed on its own.
    Completed {
        clips: Vec<Clip>,
        failures: Vec<(Side, AppError)>,
    },
}

/// One-shot capture executor, configured per trigger by the monitor.
pub struct ShotCapture {
    factory: Arc<dyn RecorderFactory>,
    busy: Arc<AtomicBool>,
    mime: String,
    post_roll: Duration,
    slice_interval: Duration,
}

impl ShotCapture {
    pub fn new(
        factory: Arc<dyn RecorderFactory>,
        busy: Arc<AtomicBool>,
        mime: String,
        post_roll: Duration,
        slice_interval: Duration,
    ) -> Self {
        Self {
            factory,
            busy,
            mime,
            post_roll: post_roll.max(MIN_POST_ROLL),
            slice_interval,
        }
    }

    /// Run one capture session across the given sides.
    ///
    /// Re-entrant triggers are a silent no-op: the first caller to win the
    /// compare-and-swap owns the session, everyone else gets `Busy`.
    pub async fn trigger(&self, inputs: Vec<ShotInput>, reason: TriggerReason) -> ShotOutcome {
        if inputs.is_empty() {
            return ShotOutcome::NoStream;
        }

        let Some(gate) = CaptureGate::acquire(&self.busy) else {
            tracing::debug!(%reason, "capture already in progress, ignoring trigger");
            return ShotOutcome::Busy;
        };

        tracing::info!(%reason, sides = inputs.len(), "recording shot");

        let mut handles = Vec::with_capacity(inputs.len());
        for input in inputs {
            // Pre-roll is frozen before the post-roll recorder starts, while
            // still inside the gated step. Evict first so a stalled rolling
            // recorder cannot leak stale segments into the snapshot.
            let pre_roll = {
                let mut buffer = input.buffer.write();
                buffer.evict_expired(tokio::time::Instant::now());
                buffer.snapshot()
            };
            let factory = self.factory.clone();
            let mime = self.mime.clone();
            let post_roll = self.post_roll;
            let slice_interval = self.slice_interval;
            let side = input.side;
            let stream = input.stream;

            handles.push((
                side,
                tokio::spawn(async move {
                    record_side(
                        factory,
                        side,
                        stream,
                        mime,
                        pre_roll,
                        post_roll,
                        slice_interval,
                        reason,
                    )
                    .await
                }),
            ));
        }

        let mut clips = Vec::new();
        let mut failures = Vec::new();
        for (side, handle) in handles {
            match handle.await {
                Ok(Ok(clip)) => clips.push(clip),
                Ok(Err(err)) => {
                    tracing::warn!(%side, error = %err, "side capture failed");
                    failures.push((side, err));
                }
                Err(join_err) => {
                    tracing::warn!(%side, error = %join_err, "side capture task aborted");
                    failures.push((side, AppError::Recording(join_err.to_string())));
                }
            }
        }

        // Release the mutual-exclusion mark before publishing.
        drop(gate);

        ShotOutcome::Completed { clips, failures }
    }
}

/// Record one side's post-roll and stitch it behind the pre-roll snapshot.
#[allow(clippy::too_many_arguments)]
async fn record_side(
    factory: Arc<dyn RecorderFactory>,
    side: Side,
    stream: Stream,
    mime: String,
    pre_roll: Vec<Segment>,
    post_roll: Duration,
    slice_interval: Duration,
    reason: TriggerReason,
) -> Result<Clip, AppError> {
    let mut recorder = factory.open(&stream, &mime);
    let mut rx = recorder
        .start(slice_interval)
        .await
        .map_err(|e| AppError::Recording(e.to_string()))?;

    // Collect live segments while the post-roll window elapses.
    let mut live: Vec<Segment> = Vec::new();
    let hold = tokio::time::sleep(post_roll);
    tokio::pin!(hold);
    loop {
        tokio::select! {
            _ = &mut hold => break,
            segment = rx.recv() => match segment {
                Some(segment) => live.push(segment),
                None => break,
            },
        }
    }

    recorder
        .stop()
        .await
        .map_err(|e| AppError::Recording(e.to_string()))?;

    // Final flush: the recorder may emit a trailing partial segment on stop.
    while let Some(segment) = rx.recv().await {
        live.push(segment);
    }

    let segment_count = pre_roll.len() + live.len();
    let mut payload = Vec::new();
    for segment in pre_roll.iter().chain(live.iter()) {
        payload.extend_from_slice(&segment.payload);
    }

    if payload.is_empty() {
        return Err(AppError::EmptyCapture(side));
    }

    let byte_len = payload.len();
    tracing::debug!(%side, byte_len, segment_count, "side capture finalized");

    Ok(Clip {
        id: Uuid::new_v4(),
        side,
        trigger: reason,
        payload,
        byte_len,
        segment_count,
        recorded_at: Utc::now(),
    })
}
