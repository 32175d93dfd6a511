use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::transport::{TransportAction, TransportEvent};
use crate::clock::{secs_to_frames, Frame};
use crate::config::ClickConfig;
use crate::constants::{CLICK_ACCENT_HZ, CLICK_DURATION_SECS, CLICK_HZ};
use crate::error::{Result, TapeError};
use crate::messages::ClickCommand;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickState {
    pub is_playing: bool,
    pub beats_per_measure: u32,
    /// Fractional frame position of the next tick; it starts on the first
    /// whole frame at or after this value
    pub next_tick_frame: f64,
    /// Beat index the next tick will sound (0 = accented downbeat)
    pub current_beat_index: u32,
    pub bpm: f64,
    pub level: f32,
}

impl ClickState {
    fn new(config: &ClickConfig) -> Self {
        Self {
            is_playing: false,
            beats_per_measure: config.beats_per_measure.max(1),
            next_tick_frame: 0.0,
            current_beat_index: 0,
            bpm: config.bpm,
            level: config.level,
        }
    }
}

pub fn frames_per_beat(bpm: f64, sample_rate: u32) -> f64 {
    60.0 / bpm * sample_rate as f64
}

/// Where the first tick lands for a start at `current` against `anchor`.
///
/// Returns `(next_tick_frame, beat_index)`. An anchor already in the past is
/// caught up to the next upcoming beat boundary so no elapsed beat is played
/// late.
pub fn first_tick(
    anchor: Option<Frame>,
    current: Frame,
    frames_per_beat: f64,
    beats_per_measure: u32,
) -> (f64, u32) {
    let beats_per_measure = beats_per_measure.max(1) as u64;
    match anchor {
        None => (current as f64, 0),
        Some(anchor) if current <= anchor => (anchor as f64, 0),
        Some(anchor) => {
            let elapsed = (current - anchor) as f64;
            let beats_elapsed = (elapsed / frames_per_beat).floor() as u64;
            let next = beats_elapsed + 1;
            (
                anchor as f64 + next as f64 * frames_per_beat,
                (next % beats_per_measure) as u32,
            )
        }
    }
}

pub struct ClickGenerator {
    sample_rate: u32,
    state: ClickState,
    commands: rtrb::Consumer<ClickCommand>,
    tick_len: usize,
    tick_remaining: usize,
    tick_freq: f64,
    phase: f64,
}

impl ClickGenerator {
    pub fn new(
        sample_rate: u32,
        config: &ClickConfig,
        commands: rtrb::Consumer<ClickCommand>,
    ) -> Self {
        Self {
            sample_rate,
            state: ClickState::new(config),
            commands,
            tick_len: secs_to_frames(CLICK_DURATION_SECS, sample_rate).max(1) as usize,
            tick_remaining: 0,
            tick_freq: CLICK_HZ,
            phase: 0.0,
        }
    }

    pub fn state(&self) -> &ClickState {
        &self.state
    }

    /// Render one block starting at clock frame `block_start`, overwriting
    /// `output`. The mono click is copied to every channel.
    pub fn process(&mut self, output: &mut [f32], channels: usize, block_start: Frame) {
        self.apply_commands(block_start);

        let channels = channels.max(1);
        for (i, frame) in output.chunks_exact_mut(channels).enumerate() {
            let sample = self.next_sample(block_start + i as Frame);
            frame.fill(sample);
        }
    }

    fn apply_commands(&mut self, now: Frame) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                ClickCommand::Set {
                    bpm,
                    beats_per_measure,
                    level,
                } => {
                    if bpm.is_finite() && bpm > 0.0 {
                        self.state.bpm = bpm;
                    }
                    self.state.beats_per_measure = beats_per_measure.max(1);
                    self.state.current_beat_index %= self.state.beats_per_measure;
                    self.state.level = level;
                }
                ClickCommand::Start { anchor } => self.start(anchor, now),
                ClickCommand::Stop => self.stop(),
            }
        }
    }

    fn start(&mut self, anchor: Option<Frame>, now: Frame) {
        let (next, beat) = first_tick(
            anchor,
            now,
            frames_per_beat(self.state.bpm, self.sample_rate),
            self.state.beats_per_measure,
        );
        self.state.next_tick_frame = next;
        self.state.current_beat_index = beat;
        self.state.is_playing = true;
        self.tick_remaining = 0;
        self.phase = 0.0;
    }

    fn stop(&mut self) {
        self.state.is_playing = false;
        self.state.current_beat_index = 0;
        self.tick_remaining = 0;
        self.phase = 0.0;
    }

    #[inline]
    fn next_sample(&mut self, now: Frame) -> f32 {
        if !self.state.is_playing {
            return 0.0;
        }
        if now as f64 >= self.state.next_tick_frame {
            self.begin_tick();
        }
        if self.tick_remaining == 0 {
            return 0.0;
        }

        let env = self.tick_remaining as f32 / self.tick_len as f32;
        let sample = self.phase.sin() as f32 * self.state.level * env;
        self.phase = (self.phase + TAU * self.tick_freq / self.sample_rate as f64) % TAU;
        self.tick_remaining -= 1;
        sample
    }

    fn begin_tick(&mut self) {
        self.phase = 0.0;
        self.tick_remaining = self.tick_len;
        self.tick_freq = if self.state.current_beat_index == 0 {
            CLICK_ACCENT_HZ
        } else {
            CLICK_HZ
        };
        self.state.next_tick_frame += frames_per_beat(self.state.bpm, self.sample_rate);
        self.state.current_beat_index =
            (self.state.current_beat_index + 1) % self.state.beats_per_measure;
    }
}

/// Tempo and meter, as published by the song/tempo collaborator
pub trait TempoSource {
    fn tempo(&self) -> f64;
    fn beats_per_measure(&self) -> u32;
}

impl TempoSource for ClickConfig {
    fn tempo(&self) -> f64 {
        self.bpm
    }

    fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure
    }
}

struct ProxyInner {
    tx: rtrb::Producer<ClickCommand>,
    sample_rate: u32,
    bpm: f64,
    beats_per_measure: u32,
    level: f32,
}

impl ProxyInner {
    fn send(&mut self, cmd: ClickCommand) -> Result<()> {
        self.tx.push(cmd).map_err(|_| TapeError::QueueFull("click command"))
    }

    fn send_settings(&mut self) -> Result<()> {
        let cmd = ClickCommand::Set {
            bpm: self.bpm,
            beats_per_measure: self.beats_per_measure,
            level: self.level,
        };
        self.send(cmd)
    }
}

/// Control-side handle for the click generator. Clones share one queue.
#[derive(Clone)]
pub struct ClickProxy {
    inner: Arc<Mutex<ProxyInner>>,
}

impl ClickProxy {
    pub fn new(
        tx: rtrb::Producer<ClickCommand>,
        sample_rate: u32,
        config: &ClickConfig,
    ) -> Result<Self> {
        let mut inner = ProxyInner {
            tx,
            sample_rate,
            bpm: config.bpm,
            beats_per_measure: config.beats_per_measure,
            level: config.level,
        };
        inner.send_settings()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ProxyInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, bpm: f64, beats_per_measure: u32, level: f32) -> Result<()> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(TapeError::Config(format!("bpm must be positive, got {}", bpm)));
        }
        if beats_per_measure == 0 {
            return Err(TapeError::Config("beats_per_measure must be non-zero".into()));
        }
        let mut inner = self.lock();
        inner.bpm = bpm;
        inner.beats_per_measure = beats_per_measure;
        inner.level = level;
        inner.send_settings()
    }

    pub fn set_level(&self, level: f32) -> Result<()> {
        let (bpm, beats) = {
            let inner = self.lock();
            (inner.bpm, inner.beats_per_measure)
        };
        self.set(bpm, beats, level)
    }

    /// Re-send settings if the provider's tempo or meter changed.
    pub fn sync_tempo(&self, source: &dyn TempoSource) -> Result<bool> {
        let (bpm, beats, level) = {
            let inner = self.lock();
            (inner.bpm, inner.beats_per_measure, inner.level)
        };
        if source.tempo() == bpm && source.beats_per_measure() == beats {
            return Ok(false);
        }
        self.set(source.tempo(), source.beats_per_measure(), level)?;
        Ok(true)
    }

    pub fn start(&self, anchor: Option<Frame>) -> Result<()> {
        self.lock().send(ClickCommand::Start { anchor })
    }

    pub fn stop(&self) -> Result<()> {
        self.lock().send(ClickCommand::Stop)
    }

    /// Follow the transport: beats are anchored to tape zero, so a start in
    /// the middle of the tape catches up to the bar grid.
    pub fn on_transport(&self, event: &TransportEvent) {
        let result = match event.action {
            TransportAction::Play => {
                let sample_rate = self.lock().sample_rate;
                let offset = secs_to_frames(event.tape_time_secs, sample_rate);
                let tape_zero = event.real_time_anchor_frame - offset;
                self.start(Some(tape_zero))
            }
            TransportAction::Stop => self.stop(),
        };
        if let Err(e) = result {
            log::warn!("Click did not follow transport {:?}: {}", event.action, e);
        }
    }

    /// A transport subscriber that forwards events to this proxy
    pub fn transport_subscriber(&self) -> impl FnMut(&TransportEvent) + Send + 'static {
        let proxy = self.clone();
        move |event| proxy.on_transport(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::click_channel;

    const SR: u32 = 48_000;

    fn generator() -> (rtrb::Producer<ClickCommand>, ClickGenerator) {
        let (tx, rx) = click_channel();
        (tx, ClickGenerator::new(SR, &ClickConfig::default(), rx))
    }

    /// Frames (relative to block start) where a tick begins.
    /// A tick opens on sin(0) == 0, so the onset is one before the first
    /// sounding sample.
    fn tick_onsets(output: &[f32]) -> Vec<usize> {
        let mut onsets = Vec::new();
        let mut in_tick = false;
        for i in 1..output.len() {
            let sounding = output[i] != 0.0;
            if sounding && !in_tick {
                onsets.push(i - 1);
            }
            in_tick = sounding;
        }
        onsets
    }

    #[test]
    fn future_anchor_ticks_exactly_at_anchor_on_downbeat() {
        let (next, beat) = first_tick(Some(10_000), 4_000, 24_000.0, 4);
        assert_eq!(next, 10_000.0);
        assert_eq!(beat, 0);

        let (next, beat) = first_tick(Some(4_000), 4_000, 24_000.0, 4);
        assert_eq!((next, beat), (4_000.0, 0));
    }

    #[test]
    fn missing_anchor_ticks_immediately() {
        assert_eq!(first_tick(None, 777, 24_000.0, 4), (777.0, 0));
    }

    #[test]
    fn late_start_catches_up_to_next_beat() {
        // 120 bpm at 48 kHz, anchor 1.25 beats ago
        let current = 100_000;
        let anchor = current - 30_000;
        let (next, beat) = first_tick(Some(anchor), current, frames_per_beat(120.0, SR), 4);
        assert_eq!(next, (anchor + 48_000) as f64);
        assert_eq!(beat, 2);
    }

    #[test]
    fn whole_beats_in_past_land_on_following_beat() {
        let fpb = 24_000.0;
        for k in 1..10i64 {
            let anchor = 5_000;
            let current = anchor + k * 24_000;
            let (next, beat) = first_tick(Some(anchor), current, fpb, 4);
            assert_eq!(next, (anchor + (k + 1) * 24_000) as f64);
            assert_eq!(beat, ((k + 1) % 4) as u32);
        }
    }

    #[test]
    fn first_tick_sounds_at_anchor_mid_block() {
        let (mut tx, mut click) = generator();
        tx.push(ClickCommand::Start { anchor: Some(1_000 + 37) }).unwrap();
        let mut out = vec![0.0f32; 128];
        click.process(&mut out, 1, 1_000);
        assert_eq!(tick_onsets(&out), vec![37]);
        assert_eq!(click.state().current_beat_index, 1);
    }

    #[test]
    fn ticks_repeat_every_beat_with_accent_cycle() {
        let (mut tx, mut click) = generator();
        tx.push(ClickCommand::Set { bpm: 120.0, beats_per_measure: 3, level: 0.5 })
            .unwrap();
        tx.push(ClickCommand::Start { anchor: Some(0) }).unwrap();

        let mut out = vec![0.0f32; 24_000 * 4];
        click.process(&mut out, 1, 0);
        assert_eq!(tick_onsets(&out), vec![0, 24_000, 48_000, 72_000]);
        // four ticks played with three beats per measure -> next is beat 1
        assert_eq!(click.state().current_beat_index, 1);
        assert_eq!(click.state().next_tick_frame, 96_000.0);
    }

    #[test]
    fn stereo_channels_carry_identical_signal() {
        let (mut tx, mut click) = generator();
        tx.push(ClickCommand::Start { anchor: None }).unwrap();
        let mut out = vec![0.0f32; 256];
        click.process(&mut out, 2, 0);
        assert!(out.chunks_exact(2).all(|f| f[0] == f[1]));
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn tick_decays_to_silence_after_duration() {
        let (mut tx, mut click) = generator();
        tx.push(ClickCommand::Start { anchor: Some(0) }).unwrap();
        let mut out = vec![0.0f32; 4_800];
        click.process(&mut out, 1, 0);
        let tick_len = (CLICK_DURATION_SECS * SR as f64) as usize;
        assert!(out[..tick_len].iter().any(|&s| s.abs() > 0.01));
        assert!(out[tick_len..].iter().all(|&s| s == 0.0));
        assert!(out.iter().all(|&s| s.abs() <= ClickConfig::default().level));
    }

    #[test]
    fn tempo_change_applies_from_next_tick() {
        let (mut tx, mut click) = generator();
        tx.push(ClickCommand::Start { anchor: Some(0) }).unwrap();
        let mut out = vec![0.0f32; 128];
        click.process(&mut out, 1, 0);
        // first tick already advanced next_tick by one 120 bpm beat
        assert_eq!(click.state().next_tick_frame, 24_000.0);

        tx.push(ClickCommand::Set { bpm: 60.0, beats_per_measure: 4, level: 0.3 })
            .unwrap();
        let mut out = vec![0.0f32; 24_000 - 128];
        click.process(&mut out, 1, 128);
        assert_eq!(click.state().next_tick_frame, 24_000.0);

        let mut out = vec![0.0f32; 128];
        click.process(&mut out, 1, 24_000);
        assert_eq!(click.state().next_tick_frame, 24_000.0 + 48_000.0);
    }

    #[test]
    fn shorter_measure_keeps_beat_index_on_grid() {
        let (mut tx, mut click) = generator();
        tx.push(ClickCommand::Start { anchor: Some(0) }).unwrap();
        let mut out = vec![0.0f32; 71_872];
        click.process(&mut out, 1, 0);
        assert_eq!(click.state().current_beat_index, 3);

        tx.push(ClickCommand::Set { bpm: 120.0, beats_per_measure: 3, level: 0.3 })
            .unwrap();
        let mut out = vec![0.0f32; 128];
        click.process(&mut out, 1, 71_872);
        assert_eq!(click.state().current_beat_index, 0);

        // next tick at 72_000 is the downbeat of the new measure
        let mut out = vec![0.0f32; 128];
        click.process(&mut out, 1, 72_000);
        assert_eq!(tick_onsets(&out), vec![0]);
        assert_eq!(click.state().current_beat_index, 1);
    }

    #[test]
    fn stop_silences_and_restart_recomputes() {
        let (mut tx, mut click) = generator();
        tx.push(ClickCommand::Start { anchor: Some(0) }).unwrap();
        let mut out = vec![0.0f32; 64];
        click.process(&mut out, 1, 0);

        tx.push(ClickCommand::Stop).unwrap();
        let mut out = vec![1.0f32; 64];
        click.process(&mut out, 1, 64);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!click.state().is_playing);

        tx.push(ClickCommand::Start { anchor: Some(50_000) }).unwrap();
        click.process(&mut out, 1, 128);
        assert_eq!(click.state().next_tick_frame, 50_000.0);
        assert_eq!(click.state().current_beat_index, 0);
    }

    #[test]
    fn proxy_anchors_click_to_tape_zero() {
        let (tx, mut rx) = click_channel();
        let proxy = ClickProxy::new(tx, SR, &ClickConfig::default()).unwrap();
        assert!(matches!(rx.pop().unwrap(), ClickCommand::Set { .. }));

        proxy.on_transport(&TransportEvent {
            action: TransportAction::Play,
            real_time_anchor_frame: 200_000,
            tape_time_secs: 2.0,
        });
        assert_eq!(rx.pop().unwrap(), ClickCommand::Start { anchor: Some(104_000) });

        proxy.on_transport(&TransportEvent {
            action: TransportAction::Stop,
            real_time_anchor_frame: 300_000,
            tape_time_secs: 4.0,
        });
        assert_eq!(rx.pop().unwrap(), ClickCommand::Stop);
    }

    struct Song {
        bpm: f64,
        beats: u32,
    }

    impl TempoSource for Song {
        fn tempo(&self) -> f64 {
            self.bpm
        }
        fn beats_per_measure(&self) -> u32 {
            self.beats
        }
    }

    #[test]
    fn proxy_resends_only_on_tempo_change() {
        let (tx, mut rx) = click_channel();
        let proxy = ClickProxy::new(tx, SR, &ClickConfig::default()).unwrap();
        rx.pop().unwrap();

        assert!(!proxy.sync_tempo(&Song { bpm: 120.0, beats: 4 }).unwrap());
        assert!(rx.pop().is_err());

        assert!(proxy.sync_tempo(&Song { bpm: 96.0, beats: 3 }).unwrap());
        assert_eq!(
            rx.pop().unwrap(),
            ClickCommand::Set {
                bpm: 96.0,
                beats_per_measure: 3,
                level: ClickConfig::default().level,
            }
        );
    }

    #[test]
    fn proxy_rejects_invalid_tempo() {
        let (tx, _rx) = click_channel();
        let proxy = ClickProxy::new(tx, SR, &ClickConfig::default()).unwrap();
        assert!(proxy.set(0.0, 4, 0.3).is_err());
        assert!(proxy.set(120.0, 0, 0.3).is_err());
    }
}
