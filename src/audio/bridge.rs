use std::sync::Arc;

use crate::audio::capture::{CaptureTelemetry, SampleBatch};
use crate::clock::{secs_to_frames, Frame};

type BatchSubscriber = Box<dyn FnMut(&SampleBatch) + Send>;

pub struct CaptureBridge {
    rx: rtrb::Consumer<SampleBatch>,
    sample_rate: u32,
    compensation_secs: f64,
    compensation_frames: Frame,
    subscribers: Vec<BatchSubscriber>,
    telemetry: Option<Arc<CaptureTelemetry>>,
    dropped_seen: u64,
}

impl CaptureBridge {
    pub fn new(rx: rtrb::Consumer<SampleBatch>, sample_rate: u32, compensation_secs: f64) -> Self {
        Self {
            rx,
            sample_rate,
            compensation_secs,
            compensation_frames: secs_to_frames(compensation_secs, sample_rate),
            subscribers: Vec::new(),
            telemetry: None,
            dropped_seen: 0,
        }
    }

    /// Watch the capture component's drop counter
    pub fn with_telemetry(mut self, telemetry: Arc<CaptureTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn compensation_secs(&self) -> f64 {
        self.compensation_secs
    }

    pub fn compensation_frames(&self) -> Frame {
        self.compensation_frames
    }

    /// Applies to batches received after this call.
    pub fn set_compensation_secs(&mut self, secs: f64) {
        self.compensation_secs = secs;
        self.compensation_frames = secs_to_frames(secs, self.sample_rate);
        log::info!(
            "Latency compensation set to {:.4}s ({} frames)",
            secs,
            self.compensation_frames
        );
    }

    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: FnMut(&SampleBatch) + Send + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Drain every queued batch. Returns how many were delivered.
    pub fn pump(&mut self) -> usize {
        self.report_drops();

        let mut delivered = 0;
        while let Ok(batch) = self.rx.pop() {
            let batch = batch.shifted_earlier(self.compensation_frames, self.sample_rate);
            for subscriber in &mut self.subscribers {
                subscriber(&batch);
            }
            delivered += 1;
        }
        delivered
    }

    fn report_drops(&mut self) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let dropped = telemetry.dropped();
        if dropped > self.dropped_seen {
            log::warn!(
                "Capture queue overflowed: {} batch(es) dropped ({} total)",
                dropped - self.dropped_seen,
                dropped
            );
            self.dropped_seen = dropped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::capture_channel;
    use std::sync::Mutex;

    fn batch(start_frame: Frame) -> SampleBatch {
        SampleBatch {
            samples: vec![0.0; 4],
            rms: 0.0,
            peak: 0.0,
            peak_index: 0,
            start_frame,
            start_time_secs: start_frame as f64 / 48_000.0,
        }
    }

    #[test]
    fn applies_compensation_before_fan_out() {
        let (mut tx, rx) = capture_channel();
        let mut bridge = CaptureBridge::new(rx, 48_000, 0.01);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bridge.subscribe(move |b| sink.lock().unwrap().push((b.start_frame, b.start_time_secs)));

        tx.push(batch(10_000)).unwrap();
        assert_eq!(bridge.pump(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, 10_000 - 480);
        assert!((seen[0].1 - (10_000.0 - 480.0) / 48_000.0).abs() < 1e-12);
    }

    #[test]
    fn subscribers_see_batches_in_arrival_order() {
        let (mut tx, rx) = capture_channel();
        let mut bridge = CaptureBridge::new(rx, 48_000, 0.0);
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&first), Arc::clone(&second));
        bridge.subscribe(move |batch| a.lock().unwrap().push(batch.start_frame));
        bridge.subscribe(move |batch| b.lock().unwrap().push(batch.start_frame));

        for start in [0, 4, 8] {
            tx.push(batch(start)).unwrap();
        }
        bridge.pump();
        assert_eq!(*first.lock().unwrap(), vec![0, 4, 8]);
        assert_eq!(*second.lock().unwrap(), vec![0, 4, 8]);
    }

    #[test]
    fn compensation_change_is_not_retroactive() {
        let (mut tx, rx) = capture_channel();
        let mut bridge = CaptureBridge::new(rx, 48_000, 0.0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bridge.subscribe(move |b| sink.lock().unwrap().push(b.start_frame));

        tx.push(batch(1_000)).unwrap();
        bridge.pump();
        bridge.set_compensation_secs(0.001);
        tx.push(batch(2_000)).unwrap();
        bridge.pump();

        assert_eq!(*seen.lock().unwrap(), vec![1_000, 2_000 - 48]);
    }
}
