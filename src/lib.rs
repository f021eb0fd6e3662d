//! shotloop - dual-camera impact capture with rolling pre-roll buffers.
//!
//! The core of an instant-replay rig: continuously monitor one or two live
//! camera feeds, keep a rolling pre-event buffer per side, capture a short
//! clip bracketing a detected impact (or a manual trigger), and expose the
//! finished clips for reduced-speed replay. A loosely coupled pairing
//! handshake establishes a remote video link that can substitute for local
//! camera access.
//!
//! Device access, recording, peer transport, and playback are all behind
//! collaborator traits; the crate contains no platform bindings.

pub mod capture;
pub mod impact;
pub mod monitor;
pub mod pairing;
pub mod replay;
pub mod source;
pub mod utils;

#[cfg(test)]
mod testutil;

pub use capture::{CaptureState, Clip, RollingBuffer, ShotOutcome, TriggerReason};
pub use impact::{AudioLevelProbe, DetectorState, ImpactConfig, ImpactDetector, LevelProbe};
pub use monitor::{Monitor, MonitorConfig, MonitorEvent, SourceSelection};
pub use pairing::{PairingManager, SenderState, ViewerState};
pub use replay::{PlaybackSurface, ReplayController, ReplayRate};
pub use source::{
    MediaSource, RecorderFactory, Segment, SegmentRecorder, Side, Stream, StreamConstraints,
};
pub use utils::error::{AppError, AppResult, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for embedding applications.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shotloop=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
