//! Transfer progress tracking.
//!
//! Progress is derived, never stored: the tracker maps acknowledged chunk
//! counts onto a fixed percentage scale so every caller reports the same
//! number for the same transfer state. Session setup accounts for the first
//! 10%, chunk transfer spans 10% to 90%, and finalization covers the rest.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a transfer currently is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Plan computed, session not yet established.
    Preparing,
    /// Session established, chunks in flight.
    Uploading,
    /// All chunks acknowledged, reassembly requested.
    Finalizing,
    Completed,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Uploading => "uploading",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point-in-time view of one transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    /// Overall completion in percent, 0 to 100.
    pub percentage: u8,
    pub chunks_acknowledged: u32,
    pub total_chunks: u32,
}

/// Percentage for `acknowledged` of `total` chunks, on the 10..=90 band.
///
/// Pure and total: 0 acknowledged chunks map to 10, all of them to 90, and
/// everything between interpolates linearly.
pub fn upload_percentage(acknowledged: u32, total: u32) -> u8 {
    if total == 0 {
        return 90;
    }
    let acknowledged = acknowledged.min(total);
    (10 + (u64::from(acknowledged) * 80) / u64::from(total)) as u8
}

/// Tracks one transfer's progress through its phases.
///
/// Reported percentages never decrease. Once [`ProgressTracker::fail`] is
/// called the percentage freezes at its last value and later phase changes
/// are ignored.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    phase: Phase,
    percentage: u8,
    chunks_acknowledged: u32,
    total_chunks: u32,
}

impl ProgressTracker {
    /// Start tracking a transfer that will move `total_chunks` chunks.
    pub fn new(total_chunks: u32) -> Self {
        Self {
            phase: Phase::Preparing,
            percentage: 0,
            chunks_acknowledged: 0,
            total_chunks,
        }
    }

    /// The session is established; chunk transfer begins at 10%.
    pub fn session_established(&mut self) {
        self.advance(Phase::Uploading, 10);
    }

    /// One more chunk has been durably acknowledged by the server.
    pub fn chunk_acknowledged(&mut self) {
        if self.phase == Phase::Error {
            return;
        }
        self.chunks_acknowledged = (self.chunks_acknowledged + 1).min(self.total_chunks);
        let pct = upload_percentage(self.chunks_acknowledged, self.total_chunks);
        self.advance(Phase::Uploading, pct);
    }

    /// Every chunk is acknowledged and reassembly has been requested.
    pub fn finalizing(&mut self) {
        self.advance(Phase::Finalizing, 90);
    }

    /// The artifact is reassembled and publicly addressable.
    pub fn completed(&mut self) {
        self.advance(Phase::Completed, 100);
    }

    /// The transfer failed terminally. Freezes the percentage.
    pub fn fail(&mut self) {
        if self.phase != Phase::Error {
            self.phase = Phase::Error;
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: self.phase,
            percentage: self.percentage,
            chunks_acknowledged: self.chunks_acknowledged,
            total_chunks: self.total_chunks,
        }
    }

    fn advance(&mut self, phase: Phase, percentage: u8) {
        if self.phase == Phase::Error {
            return;
        }
        self.phase = phase;
        // Monotonic: never report a lower percentage than before.
        self.percentage = self.percentage.max(percentage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_percentage_band() {
        assert_eq!(upload_percentage(0, 18), 10);
        assert_eq!(upload_percentage(9, 18), 50);
        assert_eq!(upload_percentage(18, 18), 90);
    }

    #[test]
    fn test_over_acknowledgement_is_clamped() {
        assert_eq!(upload_percentage(25, 18), 90);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut tracker = ProgressTracker::new(4);
        assert_eq!(tracker.snapshot().percentage, 0);
        assert_eq!(tracker.snapshot().phase, Phase::Preparing);

        tracker.session_established();
        assert_eq!(tracker.snapshot().percentage, 10);

        for _ in 0..4 {
            tracker.chunk_acknowledged();
        }
        let snap = tracker.snapshot();
        assert_eq!(snap.percentage, 90);
        assert_eq!(snap.chunks_acknowledged, 4);

        tracker.finalizing();
        assert_eq!(tracker.snapshot().phase, Phase::Finalizing);

        tracker.completed();
        let snap = tracker.snapshot();
        assert_eq!(snap.phase, Phase::Completed);
        assert_eq!(snap.percentage, 100);
    }

    #[test]
    fn test_percentage_never_decreases() {
        let mut tracker = ProgressTracker::new(10);
        tracker.session_established();
        let mut last = 0;
        for _ in 0..10 {
            tracker.chunk_acknowledged();
            let pct = tracker.snapshot().percentage;
            assert!(pct >= last);
            last = pct;
        }
    }

    #[test]
    fn test_error_freezes_percentage() {
        let mut tracker = ProgressTracker::new(10);
        tracker.session_established();
        tracker.chunk_acknowledged();
        tracker.chunk_acknowledged();
        let before = tracker.snapshot().percentage;

        tracker.fail();
        assert_eq!(tracker.snapshot().phase, Phase::Error);
        assert_eq!(tracker.snapshot().percentage, before);

        // Later events no longer move the needle.
        tracker.chunk_acknowledged();
        tracker.completed();
        assert_eq!(tracker.snapshot().phase, Phase::Error);
        assert_eq!(tracker.snapshot().percentage, before);
    }

    #[test]
    fn test_single_chunk_transfer() {
        let mut tracker = ProgressTracker::new(1);
        tracker.session_established();
        tracker.chunk_acknowledged();
        assert_eq!(tracker.snapshot().percentage, 90);
        tracker.finalizing();
        tracker.completed();
        assert_eq!(tracker.snapshot().percentage, 100);
    }
}
