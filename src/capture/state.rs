//! Capture state management
//!
//! Defines the capture state machine, trigger reasons, the finished clip
//! type, and the re-entrancy gate shared by manual and impact triggers.

use crate::source::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Current state of the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// No capture session in progress
    Idle,
    /// A triggered shot is recording its post-roll
    Capturing,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Why a shot was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerReason {
    Manual,
    Impact,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Manual => write!(f, "manual trigger"),
            TriggerReason::Impact => write!(f, "impact detected"),
        }
    }
}

/// A finished shot for one side: pre-roll plus post-roll, byte-concatenated.
///
/// Immutable once produced. Loading a newer clip for the same side
/// supersedes this one and releases its bytes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    /// Unique clip ID
    pub id: Uuid,

    /// Which camera feed produced it
    pub side: Side,

    /// What fired the capture
    pub trigger: TriggerReason,

    /// Encoded media, pre-roll bytes followed by live bytes
    #[serde(skip)]
    pub payload: Vec<u8>,

    /// Total payload size in bytes
    pub byte_len: usize,

    /// Segments concatenated into the payload
    pub segment_count: usize,

    /// Wall-clock time the shot finalized
    pub recorded_at: DateTime<Utc>,
}

/// RAII gate around the process-wide "capture in progress" flag.
///
/// Acquisition is a single compare-and-swap, so two triggers landing in the
/// same cooperative step cannot both proceed. Dropping the gate clears the
/// flag, including on early error returns.
pub(crate) struct CaptureGate {
    flag: Arc<AtomicBool>,
}

impl CaptureGate {
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for CaptureGate {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
