use std::sync::Arc;

use crate::audio::playback::{Fired, OneShotSource};
use crate::stats::TrackStatistics;

/// One tape track: a fixed-capacity mono buffer plus its name, last computed
/// statistics and the playback source currently reading it.
///
/// The buffer is shared read-only with playback voices. Writing goes through
/// [`Track::samples_mut`], which copies first if a voice still holds the
/// previous contents.
pub struct Track {
    name: String,
    samples: Arc<Vec<f32>>,
    /// Highest sample index written + 1
    len: usize,
    stats: TrackStatistics,
    source: Option<OneShotSource<Fired>>,
}

impl Track {
    pub fn new(index: usize, capacity: usize) -> Self {
        Self {
            name: format!("Track {}", index + 1),
            samples: Arc::new(vec![0.0; capacity]),
            len: 0,
            stats: TrackStatistics::silent(),
            source: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn shared_samples(&self) -> Arc<Vec<f32>> {
        Arc::clone(&self.samples)
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        Arc::make_mut(&mut self.samples).as_mut_slice()
    }

    pub fn has_data(&self) -> bool {
        self.len > 0
    }

    pub fn recorded_len(&self) -> usize {
        self.len
    }

    pub(crate) fn mark_written(&mut self, end: usize) {
        self.len = self.len.max(end.min(self.capacity()));
    }

    /// `samples[start..end]`, clamped to capacity
    pub fn slice(&self, start: usize, end: usize) -> &[f32] {
        let end = end.min(self.capacity());
        let start = start.min(end);
        &self.samples[start..end]
    }

    /// Replace the contents from the start of tape. Returns frames kept.
    pub fn load(&mut self, samples: &[f32]) -> usize {
        let kept = samples.len().min(self.capacity());
        let buf = self.samples_mut();
        buf[..kept].copy_from_slice(&samples[..kept]);
        buf[kept..].fill(0.0);
        self.len = kept;
        kept
    }

    pub fn statistics(&self) -> TrackStatistics {
        self.stats
    }

    pub fn refresh_statistics(&mut self, window_frames: usize) -> TrackStatistics {
        let recorded = &self.samples[..self.len];
        self.stats = TrackStatistics::compute_with_silent_tail(
            recorded,
            self.capacity() - self.len,
            window_frames,
        );
        self.stats
    }

    pub fn source(&self) -> Option<&OneShotSource<Fired>> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: OneShotSource<Fired>) {
        self.source = Some(source);
    }

    pub fn take_source(&mut self) -> Option<OneShotSource<Fired>> {
        self.source.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_track_is_silent_and_named() {
        let track = Track::new(2, 16);
        assert_eq!(track.name(), "Track 3");
        assert_eq!(track.capacity(), 16);
        assert!(!track.has_data());
        assert!(track.samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn write_copies_when_a_voice_holds_the_buffer() {
        let mut track = Track::new(0, 4);
        let held = track.shared_samples();
        track.samples_mut()[0] = 1.0;
        assert_eq!(held[0], 0.0);
        assert_eq!(track.samples()[0], 1.0);
    }

    #[test]
    fn load_truncates_to_capacity() {
        let mut track = Track::new(0, 4);
        assert_eq!(track.load(&[0.5; 10]), 4);
        assert_eq!(track.recorded_len(), 4);
        assert_eq!(track.samples(), &[0.5; 4]);
    }

    #[test]
    fn samples_mut_writes_in_place() {
        let mut track = Track::new(0, 8);
        track.samples_mut()[2..4].copy_from_slice(&[0.5, -0.5]);
        track.mark_written(4);
        assert_eq!(&track.samples()[..5], &[0.0, 0.0, 0.5, -0.5, 0.0]);
        assert_eq!(track.recorded_len(), 4);
    }

    #[test]
    fn statistics_match_a_full_scan() {
        let mut track = Track::new(0, 1_000);
        track.load(&[0.5; 100]);
        let stats = track.refresh_statistics(400);
        assert_eq!(stats, TrackStatistics::compute(track.samples(), 400));

        let stats = track.refresh_statistics(50);
        assert_eq!(stats, TrackStatistics::compute(track.samples(), 50));

        let stats = track.refresh_statistics(5_000);
        assert_eq!(stats, TrackStatistics::compute(track.samples(), 5_000));
    }

    #[test]
    fn statistics_of_empty_track_are_silent() {
        let mut track = Track::new(0, 1_000);
        assert_eq!(track.refresh_statistics(400), TrackStatistics::silent());
    }

    #[test]
    fn slice_clamps_to_capacity() {
        let track = Track::new(0, 8);
        assert_eq!(track.slice(6, 100).len(), 2);
        assert_eq!(track.slice(20, 100).len(), 0);
    }
}
