//! Collaborator contracts for media acquisition and segment recording
//!
//! Platform-agnostic traits for the camera/microphone layer and the
//! segmenting recorder. The core never talks to real devices directly;
//! production wiring supplies implementations of these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// One of the two independent camera feeds tracked in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

/// Where a stream's frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamOrigin {
    /// A physical device attached to this machine
    Local,
    /// Media arriving over a paired peer connection
    Remote,
}

/// Opaque handle to a live sequence of video (and optionally audio) frames.
///
/// Owned by the monitor; every other component holds references or clones
/// of the handle, never the underlying device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    /// Unique stream ID
    pub id: Uuid,

    /// Human-readable label (device name or remote peer tag)
    pub label: String,

    /// Whether the stream carries an audio track
    pub has_audio: bool,

    /// Local device or remote peer
    pub origin: StreamOrigin,
}

impl Stream {
    pub fn local(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            has_audio: false,
            origin: StreamOrigin::Local,
        }
    }

    pub fn remote(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            has_audio: false,
            origin: StreamOrigin::Remote,
        }
    }
}

/// Constraints requested when acquiring a camera stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConstraints {
    /// Exact device ID to open, or any camera when absent
    pub device_id: Option<String>,

    /// Requested width in pixels
    pub width: u32,

    /// Requested height in pixels
    pub height: u32,

    /// Requested frame rate
    pub frame_rate: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            width: 1280,
            height: 720,
            frame_rate: 60,
        }
    }
}

/// An immutable, time-stamped chunk of encoded media data.
///
/// Produced by an active recorder; ownership transfers to the rolling
/// buffer (or a capture session) on production.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Encoded media bytes
    pub payload: Vec<u8>,

    /// Monotonic production time, used for retention math
    pub captured_at: Instant,

    /// Wall-clock production time, for display and metadata
    pub recorded_at: DateTime<Utc>,
}

impl Segment {
    /// Stamp a freshly produced payload with the current time.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            captured_at: Instant::now(),
            recorded_at: Utc::now(),
        }
    }
}

/// Camera/microphone acquisition contract.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Open a live stream matching the constraints.
    ///
    /// Errors map to `AppError::DeviceUnavailable` in the core.
    async fn acquire(&self, constraints: &StreamConstraints) -> anyhow::Result<Stream>;

    /// Release a previously acquired stream and its device.
    async fn release(&self, stream: &Stream);
}

/// A recorder bound to one stream, emitting segments at a fixed cadence.
///
/// `stop` must not resolve until the final flush has been delivered on the
/// receiver returned by `start`; the sender side is dropped afterwards so
/// consumers observe end-of-stream. A recorder may emit one last partial
/// segment on stop. Zero-length payloads are discarded at the producer.
#[async_trait]
pub trait SegmentRecorder: Send {
    async fn start(
        &mut self,
        slice_interval: Duration,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<Segment>>;

    async fn stop(&mut self) -> anyhow::Result<()>;
}

/// Factory for recorders plus encoding-format selection.
pub trait RecorderFactory: Send + Sync {
    /// First supported MIME type from a priority list, if any.
    fn choose_supported(&self, priorities: &[String]) -> Option<String>;

    /// Open a recorder on the given stream with the chosen format.
    fn open(&self, stream: &Stream, mime: &str) -> Box<dyn SegmentRecorder>;
}
