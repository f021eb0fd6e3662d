//! Capture pipeline
//!
//! This module implements the triggered-capture architecture:
//! - RollingBuffer for per-side pre-roll history
//! - ShotCapture to orchestrate a gated pre-roll + post-roll shot
//! - Capture state machine, trigger reasons, and the finished Clip type

pub mod buffer;
pub mod shot;
pub mod state;

pub use buffer::RollingBuffer;
pub use shot::{ShotCapture, ShotInput, ShotOutcome};
pub use state::{CaptureState, Clip, TriggerReason};
