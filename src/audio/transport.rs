use crossbeam_channel::{Receiver, Sender};

use crate::audio::bridge::CaptureBridge;
use crate::audio::buffer::Track;
use crate::audio::capture::SampleBatch;
use crate::audio::mixer::Mixer;
use crate::audio::playback::{OneShotSource, PlaybackControl, SourceId};
use crate::audio::recorder::write_clipped;
use crate::clock::{secs_to_frames, Frame, FrameClock, TapeMapping};
use crate::config::EngineConfig;
use crate::constants::{CHANNEL_CAPACITY, RMS_WINDOW_SECS};
use crate::error::{Result, TapeError};
use crate::messages::PlaybackEvent;
use crate::project::export::{Exporter, UploadHandle};
use crate::stats::TrackStatistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    Play,
    Stop,
}

/// Broadcast to every subscriber when a transport command executes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportEvent {
    pub action: TransportAction,
    /// For `Play`, the frame every source starts on; for `Stop`, the frame
    /// the sources were disconnected at
    pub real_time_anchor_frame: Frame,
    pub tape_time_secs: f64,
}

/// Arguments to [`TransportOrchestrator::start_playback`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackRequest {
    pub start_secs: f64,
    /// `None` plays to the end of the tape
    pub stop_secs: Option<f64>,
    /// `None` means no recording on this pass
    pub punch_in_secs: Option<f64>,
    pub punch_out_secs: Option<f64>,
}

impl PlaybackRequest {
    pub fn from_secs(start_secs: f64) -> Self {
        Self {
            start_secs,
            ..Self::default()
        }
    }

    pub fn until(mut self, stop_secs: f64) -> Self {
        self.stop_secs = Some(stop_secs);
        self
    }

    pub fn punch_in(mut self, secs: f64) -> Self {
        self.punch_in_secs = Some(secs);
        self
    }

    pub fn punch_out(mut self, secs: f64) -> Self {
        self.punch_out_secs = Some(secs);
        self
    }

    /// `tape_secs` is the tape length; start and stop must fall on the tape.
    fn validate(&self, tape_secs: f64) -> Result<()> {
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !finite_non_negative(self.start_secs) || self.start_secs > tape_secs {
            return Err(TapeError::range(format!(
                "start {} must lie within the {}s tape",
                self.start_secs, tape_secs
            )));
        }
        if let Some(stop) = self.stop_secs {
            if !stop.is_finite() || stop <= self.start_secs {
                return Err(TapeError::range(format!(
                    "stop {} must come after start {}",
                    stop, self.start_secs
                )));
            }
            if stop > tape_secs {
                return Err(TapeError::range(format!(
                    "stop {} is past the end of the {}s tape",
                    stop, tape_secs
                )));
            }
        }
        for punch in [self.punch_in_secs, self.punch_out_secs].into_iter().flatten() {
            if !finite_non_negative(punch) {
                return Err(TapeError::range(format!("punch point {} must be >= 0", punch)));
            }
        }
        if let (Some(punch_in), Some(punch_out)) = (self.punch_in_secs, self.punch_out_secs) {
            if punch_in > punch_out {
                return Err(TapeError::range(format!(
                    "punch-in {} is after punch-out {}",
                    punch_in, punch_out
                )));
            }
        }
        Ok(())
    }
}

/// Resolves once, at the next `stop`.
pub struct EndWaiter {
    rx: Receiver<TransportEvent>,
}

impl EndWaiter {
    /// Block until the transport stops. `None` if the orchestrator went away.
    pub fn wait(self) -> Option<TransportEvent> {
        self.rx.recv().ok()
    }

    pub fn try_wait(&self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }
}

type TransportSubscriber = Box<dyn FnMut(&TransportEvent) + Send>;

pub struct TransportOrchestrator {
    sample_rate: u32,
    track_capacity: usize,
    max_tracks: usize,
    lead_frames: Frame,
    window_frames: usize,
    clock: FrameClock,
    playback: PlaybackControl,
    mixer: Box<dyn Mixer>,
    tracks: Vec<Track>,
    armed: Option<usize>,
    mapping: Option<TapeMapping>,
    punch_in: Option<Frame>,
    punch_out: Option<Frame>,
    /// Tape frame at which this pass ends, when bounded
    stop_at: Option<Frame>,
    /// Source whose completion ends the pass
    lead_source: Option<SourceId>,
    subscribers: Vec<TransportSubscriber>,
    waiters: Vec<Sender<TransportEvent>>,
    capture_rx: Option<Receiver<SampleBatch>>,
    capacity_warned: bool,
}

impl TransportOrchestrator {
    pub fn new(
        config: &EngineConfig,
        clock: FrameClock,
        playback: PlaybackControl,
        mixer: Box<dyn Mixer>,
    ) -> Self {
        Self {
            sample_rate: config.sample_rate,
            track_capacity: config.track_capacity(),
            max_tracks: config.max_tracks,
            lead_frames: secs_to_frames(config.transport_lead_secs, config.sample_rate),
            window_frames: secs_to_frames(RMS_WINDOW_SECS, config.sample_rate) as usize,
            clock,
            playback,
            mixer,
            tracks: Vec::new(),
            armed: None,
            mapping: None,
            punch_in: None,
            punch_out: None,
            stop_at: None,
            lead_source: None,
            subscribers: Vec::new(),
            waiters: Vec::new(),
            capture_rx: None,
            capacity_warned: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn armed_track(&self) -> Option<usize> {
        self.armed
    }

    pub fn is_rolling(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn tape_zero_frame(&self) -> Option<Frame> {
        self.mapping.map(|m| m.tape_zero_frame())
    }

    /// Current tape position while rolling
    pub fn position_secs(&self) -> Option<f64> {
        self.mapping.map(|m| m.tape_secs_at(self.clock.now()))
    }

    /// Called in registration order with every transport event
    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: FnMut(&TransportEvent) + Send + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Route the bridge's batches into this orchestrator; they are consumed
    /// by [`poll`](Self::poll).
    pub fn attach_capture(&mut self, bridge: &mut CaptureBridge) {
        let (tx, rx) = crossbeam_channel::bounded::<SampleBatch>(CHANNEL_CAPACITY);
        bridge.subscribe(move |batch| {
            if tx.try_send(batch.clone()).is_err() {
                log::warn!(
                    "Transport inbox full; batch at frame {} dropped",
                    batch.start_frame
                );
            }
        });
        self.capture_rx = Some(rx);
    }

    fn ensure_track(&mut self, index: usize) -> Result<()> {
        if index >= self.max_tracks {
            return Err(TapeError::TrackLimit {
                index,
                max: self.max_tracks,
            });
        }
        while self.tracks.len() <= index {
            let next = self.tracks.len();
            self.tracks.push(Track::new(next, self.track_capacity));
        }
        Ok(())
    }

    /// Arm `index` (or the next unused track) as the recording target,
    /// creating tracks up to it. Returns the armed index.
    pub fn arm(&mut self, index: Option<usize>) -> Result<usize> {
        let index = index.unwrap_or(self.tracks.len());
        self.ensure_track(index)?;
        if let Some(previous) = self.armed.filter(|&p| p != index) {
            log::debug!("Disarming track {}", previous);
        }
        self.armed = Some(index);
        log::info!("Armed track {} ({})", index, self.tracks[index].name());
        Ok(index)
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    /// Replace a track's contents from tape zero, creating it if needed
    pub fn load_track(&mut self, index: usize, samples: &[f32]) -> Result<usize> {
        self.ensure_track(index)?;
        let kept = self.tracks[index].load(samples);
        if kept < samples.len() {
            log::warn!(
                "Track {} truncated to capacity: kept {} of {} frames",
                index,
                kept,
                samples.len()
            );
        }
        self.tracks[index].refresh_statistics(self.window_frames);
        Ok(kept)
    }

    pub fn start_playback(&mut self, request: PlaybackRequest) -> Result<()> {
        let tape_secs = self.track_capacity as f64 / self.sample_rate as f64;
        request.validate(tape_secs)?;

        let anchor = self.clock.now() + self.lead_frames;
        let mapping = TapeMapping::anchored(anchor, request.start_secs, self.sample_rate);
        let sr = self.sample_rate;
        // punch points past the tape clip to its end
        let capacity = self.track_capacity as Frame;
        let punch_in = request.punch_in_secs.map(|s| secs_to_frames(s, sr).min(capacity));
        let punch_out = request.punch_out_secs.map(|s| secs_to_frames(s, sr).min(capacity));
        let stop_at = request.stop_secs.map(|s| secs_to_frames(s, sr));

        if punch_in.is_some() && self.armed.is_none() {
            log::warn!("Punch-in set with no armed track; this pass will not record");
        }

        self.disconnect_sources();

        let offset = secs_to_frames(request.start_secs, sr) as usize;
        let end = stop_at.map_or(self.track_capacity, |f| f as usize);
        self.lead_source = None;
        let mut failure = None;
        for (index, track) in self.tracks.iter_mut().enumerate() {
            if Some(index) == self.armed {
                continue;
            }
            let id = self.playback.next_id();
            let source = OneShotSource::new(id, index, track.shared_samples(), offset, end);
            if source.is_empty() {
                continue;
            }
            match source.start(anchor, &mut self.playback) {
                Ok(mut fired) => {
                    fired.set_channel(self.mixer.patch(id, index));
                    self.lead_source.get_or_insert(id);
                    track.set_source(fired);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            self.disconnect_sources();
            self.lead_source = None;
            return Err(e);
        }

        self.mapping = Some(mapping);
        self.punch_in = punch_in;
        self.punch_out = punch_out;
        self.stop_at = stop_at;
        self.capacity_warned = false;

        log::info!(
            "Transport play from {:.3}s at frame {} (tape zero {}){}",
            request.start_secs,
            anchor,
            mapping.tape_zero_frame(),
            match (self.armed, punch_in) {
                (Some(track), Some(_)) => format!(", recording track {}", track),
                _ => String::new(),
            }
        );

        self.emit(TransportEvent {
            action: TransportAction::Play,
            real_time_anchor_frame: anchor,
            tape_time_secs: request.start_secs,
        });
        Ok(())
    }

    /// Stop the tape. Does nothing when already stopped.
    pub fn stop(&mut self) {
        let Some(mapping) = self.mapping else {
            log::debug!("stop() while not rolling ignored");
            return;
        };

        self.disconnect_sources();
        let now = self.clock.now();
        let event = TransportEvent {
            action: TransportAction::Stop,
            real_time_anchor_frame: now,
            tape_time_secs: mapping.tape_secs_at(now),
        };
        self.emit(event);

        self.mapping = None;
        self.punch_in = None;
        self.punch_out = None;
        self.stop_at = None;
        self.lead_source = None;

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(event);
        }

        for track in &mut self.tracks {
            track.refresh_statistics(self.window_frames);
        }
        log::info!("Transport stopped at {:.3}s", event.tape_time_secs);
    }

    pub fn wait_for_end(&mut self) -> EndWaiter {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.waiters.push(tx);
        EndWaiter { rx }
    }

    /// Control-loop step: route captured batches, react to finished sources,
    /// enforce the stop bound and free retired voices.
    pub fn poll(&mut self) {
        if let Some(rx) = self.capture_rx.clone() {
            while let Ok(batch) = rx.try_recv() {
                self.handle_samples(&batch);
            }
        }

        while let Some(event) = self.playback.pop_event() {
            match event {
                PlaybackEvent::Ended(id) => self.on_source_ended(id),
            }
        }

        // also covers a lost or missing completion notice
        if let (Some(mapping), Some(stop_at)) = (self.mapping, self.stop_at) {
            if mapping.to_tape_frame(self.clock.now()) >= stop_at {
                self.stop();
            }
        }

        self.playback.collect_retired();
    }

    fn on_source_ended(&mut self, id: SourceId) {
        if self.mapping.is_none() {
            log::debug!("Completion of {} after stop suppressed", id);
            return;
        }
        if self.lead_source == Some(id) {
            log::debug!("{} reached its end; stopping", id);
            self.stop();
        }
    }

    /// Write a captured batch into the armed track, clipped to the punch
    /// window. Ignored unless a track is armed, the tape is rolling and
    /// punch-in is set.
    pub fn handle_samples(&mut self, batch: &SampleBatch) {
        let (Some(armed), Some(mapping), Some(punch_in)) = (self.armed, self.mapping, self.punch_in)
        else {
            return;
        };
        let punch_out = self.punch_out.unwrap_or(Frame::MAX);

        let start = mapping.to_tape_frame(batch.start_frame);
        let end = start + batch.len() as Frame;
        if end <= punch_in || start >= punch_out {
            return;
        }

        let from = start.max(punch_in);
        let to = end.min(punch_out);
        let samples = &batch.samples[(from - start) as usize..(to - start) as usize];
        let track = &mut self.tracks[armed];
        let outcome = write_clipped(track, from, samples);
        if outcome.clipped > 0 && !self.capacity_warned {
            log::warn!(
                "Track {} is full ({} frames); recording past the end is discarded",
                armed,
                track.capacity()
            );
            self.capacity_warned = true;
        }
    }

    fn disconnect_sources(&mut self) {
        for track in &mut self.tracks {
            if let Some(source) = track.take_source() {
                self.mixer.unpatch(source.id());
                source.disconnect(&mut self.playback);
            }
        }
    }

    fn emit(&mut self, event: TransportEvent) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }

    fn track(&self, index: usize) -> Result<&Track> {
        self.tracks.get(index).ok_or(TapeError::InvalidIndex {
            index,
            len: self.tracks.len(),
        })
    }

    fn track_mut(&mut self, index: usize) -> Result<&mut Track> {
        let len = self.tracks.len();
        self.tracks
            .get_mut(index)
            .ok_or(TapeError::InvalidIndex { index, len })
    }

    /// Samples of track `index` between two tape times, clamped to capacity
    pub fn track_slice(&self, index: usize, start_secs: f64, end_secs: f64) -> Result<&[f32]> {
        let track = self.track(index)?;
        let finite = start_secs.is_finite() && end_secs.is_finite();
        if !finite || start_secs < 0.0 || end_secs < start_secs {
            return Err(TapeError::range(format!(
                "slice {}..{} is not a forward range",
                start_secs, end_secs
            )));
        }
        let start = secs_to_frames(start_secs, self.sample_rate) as usize;
        let end = secs_to_frames(end_secs, self.sample_rate) as usize;
        Ok(track.slice(start, end))
    }

    /// Recompute and return a track's statistics
    pub fn track_statistics(&mut self, index: usize) -> Result<TrackStatistics> {
        let window = self.window_frames;
        Ok(self.track_mut(index)?.refresh_statistics(window))
    }

    /// Statistics as of the last recompute
    pub fn cached_statistics(&self, index: usize) -> Result<TrackStatistics> {
        Ok(self.track(index)?.statistics())
    }

    pub fn track_name(&self, index: usize) -> Result<&str> {
        Ok(self.track(index)?.name())
    }

    pub fn set_track_name(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        self.track_mut(index)?.set_name(name);
        Ok(())
    }

    pub fn export_slice(
        &self,
        index: usize,
        start_secs: f64,
        end_secs: f64,
        exporter: &mut dyn Exporter,
    ) -> Result<UploadHandle> {
        let samples = self.track_slice(index, start_secs, end_secs)?;
        let name = self.track(index)?.name();
        exporter.export(samples, self.sample_rate, name)
    }

    /// Silence everything on the audio side, tracked or not
    pub fn shutdown(&mut self) -> Result<()> {
        self.stop();
        self.playback.disconnect_all()
    }
}
