//! Replay control
//!
//! Holds the most recent clip per side and drives the playback surface at
//! discrete reduced-speed rates.

use crate::capture::Clip;
use crate::source::Side;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Discrete operator playback rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayRate {
    Quarter,
    Half,
    Normal,
}

impl ReplayRate {
    pub fn multiplier(self) -> f64 {
        match self {
            ReplayRate::Quarter => 0.25,
            ReplayRate::Half => 0.5,
            ReplayRate::Normal => 1.0,
        }
    }
}

/// Playback collaborator: plays a clip from the start at the given rate.
/// No seeking or scrubbing contract beyond that.
pub trait PlaybackSurface: Send + Sync {
    fn present(&self, side: Side, clip: &Clip, rate: ReplayRate);
}

/// Exposes finished clips for variable-rate playback.
pub struct ReplayController {
    surface: Arc<dyn PlaybackSurface>,
    slots: RwLock<[Option<Clip>; 2]>,
}

impl ReplayController {
    pub fn new(surface: Arc<dyn PlaybackSurface>) -> Self {
        Self {
            surface,
            slots: RwLock::new([None, None]),
        }
    }

    fn index(side: Side) -> usize {
        match side {
            Side::A => 0,
            Side::B => 1,
        }
    }

    /// Publish a finished clip, superseding and releasing any prior clip
    /// for the same side.
    pub fn load(&self, clip: Clip) {
        let mut slots = self.slots.write();
        let slot = &mut slots[Self::index(clip.side)];
        if slot.is_some() {
            tracing::debug!(side = %clip.side, "superseding prior clip");
        }
        *slot = Some(clip);
    }

    pub fn clip(&self, side: Side) -> Option<Clip> {
        self.slots.read()[Self::index(side)].clone()
    }

    pub fn has_clip(&self, side: Side) -> bool {
        self.slots.read()[Self::index(side)].is_some()
    }

    /// Play every loaded side from the start at the given rate.
    /// Returns how many sides were played.
    pub fn replay_all(&self, rate: ReplayRate) -> usize {
        let slots = self.slots.read();
        let mut played = 0;
        for slot in slots.iter().flatten() {
            self.surface.present(slot.side, slot, rate);
            played += 1;
        }
        if played > 0 {
            tracing::info!(rate = rate.multiplier(), played, "replaying clips");
        }
        played
    }
}
