use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// One sample period. Signed so tape-relative positions before zero work.
pub type Frame = i64;

/// Convert seconds to the nearest whole frame
pub fn secs_to_frames(secs: f64, sample_rate: u32) -> Frame {
    (secs * sample_rate as f64).round() as Frame
}

pub fn frames_to_secs(frames: Frame, sample_rate: u32) -> f64 {
    frames as f64 / sample_rate as f64
}

/// Monotonic hardware-driven frame counter.
///
/// Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    frames: Arc<AtomicI64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current frame
    #[inline]
    pub fn now(&self) -> Frame {
        self.frames.load(Ordering::Acquire)
    }

    /// Advance by `frames` after a block has been rendered.
    #[inline]
    pub fn advance(&self, frames: usize) -> Frame {
        self.frames.fetch_add(frames as Frame, Ordering::AcqRel) + frames as Frame
    }
}

/// Tape-zero mapping, valid only while the tape is rolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeMapping {
    tape_zero_frame: Frame,
    sample_rate: u32,
}

impl TapeMapping {
    /// `tape_zero = anchor - round(start_secs * sample_rate)`
    pub fn anchored(anchor_frame: Frame, start_tape_secs: f64, sample_rate: u32) -> Self {
        Self {
            tape_zero_frame: anchor_frame - secs_to_frames(start_tape_secs, sample_rate),
            sample_rate,
        }
    }

    pub fn tape_zero_frame(&self) -> Frame {
        self.tape_zero_frame
    }

    /// Clock frame to tape-frame offset
    #[inline]
    pub fn to_tape_frame(&self, frame: Frame) -> Frame {
        frame - self.tape_zero_frame
    }

    #[inline]
    pub fn to_clock_frame(&self, tape_frame: Frame) -> Frame {
        tape_frame + self.tape_zero_frame
    }

    pub fn tape_secs_at(&self, frame: Frame) -> f64 {
        frames_to_secs(self.to_tape_frame(frame), self.sample_rate)
    }
}
