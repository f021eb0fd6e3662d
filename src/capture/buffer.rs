//! Rolling pre-roll buffer
//!
//! Continuously collects recorder segments for one side and retains only
//! those inside the configured window, producing the pre-roll history a
//! triggered shot is seeded from.

use crate::source::Segment;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Time-windowed segment buffer for one camera side.
///
/// Insertion order is temporal order; segments are never reordered.
/// Eviction runs eagerly on every append, so the buffer holds exactly the
/// segments produced within the last `retention` interval.
pub struct RollingBuffer {
    segments: VecDeque<Segment>,
    retention: Duration,
}

impl RollingBuffer {
    pub fn new(retention: Duration) -> Self {
        Self {
            segments: VecDeque::new(),
            retention,
        }
    }

    /// Append a segment and evict anything that just fell out of the window.
    pub fn append(&mut self, segment: Segment) {
        self.segments.push_back(segment);
        self.evict_expired(Instant::now());
    }

    /// Drop all segments at least `retention` old.
    pub fn evict_expired(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.retention) else {
            return;
        };
        while let Some(front) = self.segments.front() {
            if front.captured_at <= cutoff {
                self.segments.pop_front();
            } else {
                break;
            }
        }
    }

    /// Ordered copy of the current contents, oldest first.
    ///
    /// Empty when no segment has ever been produced (stream not ready);
    /// callers treat that as "no pre-roll available", not an error.
    pub fn snapshot(&self) -> Vec<Segment> {
        self.segments.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
