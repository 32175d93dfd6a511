use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{frames_to_secs, Frame};
use crate::stats::LevelMeter;

/// One emitted capture batch. Immutable once it leaves the capture component.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub samples: Vec<f32>,
    pub rms: f32,
    pub peak: f32,
    /// Index of the peak sample within `samples`
    pub peak_index: usize,
    /// Clock frame of the first sample
    pub start_frame: Frame,
    pub start_time_secs: f64,
}

impl SampleBatch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// One past the last sample's frame
    pub fn end_frame(&self) -> Frame {
        self.start_frame + self.samples.len() as Frame
    }

    /// Same audio reported `frames` earlier
    pub fn shifted_earlier(self, frames: Frame, sample_rate: u32) -> Self {
        Self {
            start_frame: self.start_frame - frames,
            start_time_secs: self.start_time_secs - frames_to_secs(frames, sample_rate),
            ..self
        }
    }
}

/// Counters the capture component updates from the audio thread
#[derive(Debug, Default)]
pub struct CaptureTelemetry {
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl CaptureTelemetry {
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Batches discarded because the control side was not draining
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Accumulates mono input into batches of `batch_frames` and emits them
/// without ever blocking. A full queue drops the batch.
pub struct CaptureProcessor {
    sample_rate: u32,
    batch_frames: usize,
    pending: Vec<f32>,
    meter: LevelMeter,
    batch_start: Frame,
    tx: rtrb::Producer<SampleBatch>,
    telemetry: Arc<CaptureTelemetry>,
}

impl CaptureProcessor {
    pub fn new(sample_rate: u32, batch_frames: usize, tx: rtrb::Producer<SampleBatch>) -> Self {
        let batch_frames = batch_frames.max(1);
        Self {
            sample_rate,
            batch_frames,
            pending: Vec::with_capacity(batch_frames),
            meter: LevelMeter::new(),
            batch_start: 0,
            tx,
            telemetry: Arc::new(CaptureTelemetry::default()),
        }
    }

    pub fn telemetry(&self) -> Arc<CaptureTelemetry> {
        Arc::clone(&self.telemetry)
    }

    /// Feed one interleaved input quantum whose first frame is `now`.
    ///
    /// Multi-channel frames are summed to mono before accumulation.
    pub fn process(&mut self, input: &[f32], channels: usize, now: Frame) {
        let channels = channels.max(1);
        for (i, frame) in input.chunks_exact(channels).enumerate() {
            if self.pending.is_empty() {
                self.batch_start = now + i as Frame;
            }
            let mono: f32 = frame.iter().sum();
            self.pending.push(mono);
            self.meter.push(mono);

            if self.pending.len() == self.batch_frames {
                self.emit();
            }
        }
    }

    fn emit(&mut self) {
        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_frames));
        let batch = SampleBatch {
            samples,
            rms: self.meter.rms(),
            peak: self.meter.peak(),
            peak_index: self.meter.peak_index(),
            start_frame: self.batch_start,
            start_time_secs: frames_to_secs(self.batch_start, self.sample_rate),
        };
        self.meter.reset();

        match self.tx.push(batch) {
            Ok(()) => {
                self.telemetry.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.telemetry.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
