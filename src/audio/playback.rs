use std::fmt;
use std::sync::Arc;

use crate::audio::mixer::ChannelHandle;
use crate::clock::Frame;
use crate::error::{Result, TapeError};
use crate::messages::{
    playback_command_channel, playback_event_channel, retire_channel, PlaybackCommand,
    PlaybackEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Real-time half of a source: a shared read-only view of a track buffer and
/// the frame window to play from it.
pub struct Voice {
    id: SourceId,
    samples: Arc<Vec<f32>>,
    /// Clock frame at which `offset` is heard
    start_frame: Frame,
    offset: usize,
    /// Exclusive sample index
    end: usize,
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("start_frame", &self.start_frame)
            .field("offset", &self.offset)
            .field("end", &self.end)
            .finish()
    }
}

impl Voice {
    /// Mix this voice into `output`. Returns true once its end was reached.
    #[inline]
    fn render(&self, output: &mut [f32], channels: usize, block_start: Frame) -> bool {
        for (i, frame) in output.chunks_exact_mut(channels).enumerate() {
            let now = block_start + i as Frame;
            if now < self.start_frame {
                continue;
            }
            let pos = self.offset + (now - self.start_frame) as usize;
            if pos >= self.end {
                return true;
            }
            let sample = self.samples[pos];
            for out in frame.iter_mut() {
                *out += sample;
            }
        }
        let frames = (output.len() / channels) as Frame;
        let next = block_start + frames;
        next > self.start_frame && self.offset + (next - self.start_frame) as usize >= self.end
    }
}

pub struct Armed {
    voice: Box<Voice>,
}

pub struct Fired {
    start_frame: Frame,
    channel: Option<ChannelHandle>,
}

pub struct Spent;

/// Built `Armed`, `Fired` once handed to the renderer, `Spent` after
/// disconnect. Only `Armed` can start, so a source never plays twice.
pub struct OneShotSource<S> {
    id: SourceId,
    track: usize,
    state: S,
}

impl<S> OneShotSource<S> {
    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn track(&self) -> usize {
        self.track
    }
}

impl OneShotSource<Armed> {
    /// Play `samples[offset..end]`; `end` is clamped to the buffer.
    pub fn new(
        id: SourceId,
        track: usize,
        samples: Arc<Vec<f32>>,
        offset: usize,
        end: usize,
    ) -> Self {
        let end = end.min(samples.len());
        Self {
            id,
            track,
            state: Armed {
                voice: Box::new(Voice {
                    id,
                    samples,
                    start_frame: 0,
                    offset,
                    end,
                }),
            },
        }
    }

    /// Number of frames this source will play
    pub fn len(&self) -> usize {
        self.state.voice.end.saturating_sub(self.state.voice.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the voice to the renderer so that its first sample is heard at
    /// clock frame `at`.
    pub fn start(self, at: Frame, control: &mut PlaybackControl) -> Result<OneShotSource<Fired>> {
        let mut voice = self.state.voice;
        voice.start_frame = at;
        control
            .commands
            .push(PlaybackCommand::Start(voice))
            .map_err(|_| TapeError::QueueFull("playback command"))?;
        Ok(OneShotSource {
            id: self.id,
            track: self.track,
            state: Fired {
                start_frame: at,
                channel: None,
            },
        })
    }
}

impl OneShotSource<Fired> {
    pub fn start_frame(&self) -> Frame {
        self.state.start_frame
    }

    pub fn channel(&self) -> Option<ChannelHandle> {
        self.state.channel
    }

    pub fn set_channel(&mut self, channel: ChannelHandle) {
        self.state.channel = Some(channel);
    }

    /// Disconnect from the renderer. The source cannot be used again.
    pub fn disconnect(self, control: &mut PlaybackControl) -> OneShotSource<Spent> {
        if control.commands.push(PlaybackCommand::Disconnect(self.id)).is_err() {
            log::warn!("Playback queue full; {} may keep sounding", self.id);
        }
        OneShotSource {
            id: self.id,
            track: self.track,
            state: Spent,
        }
    }
}

/// Control-side ends of the playback queues
pub struct PlaybackControl {
    commands: rtrb::Producer<PlaybackCommand>,
    events: rtrb::Consumer<PlaybackEvent>,
    retired: rtrb::Consumer<Box<Voice>>,
    next_id: u64,
}

impl PlaybackControl {
    pub fn next_id(&mut self) -> SourceId {
        self.next_id += 1;
        SourceId(self.next_id)
    }

    /// Silence every voice, including ones this side no longer tracks
    pub fn disconnect_all(&mut self) -> Result<()> {
        self.commands
            .push(PlaybackCommand::DisconnectAll)
            .map_err(|_| TapeError::QueueFull("playback command"))
    }

    /// Next completion notice from the renderer, if any
    pub fn pop_event(&mut self) -> Option<PlaybackEvent> {
        self.events.pop().ok()
    }

    /// Free voices the renderer has let go of. Returns how many were freed.
    pub fn collect_retired(&mut self) -> usize {
        let mut freed = 0;
        while let Ok(voice) = self.retired.pop() {
            drop(voice);
            freed += 1;
        }
        freed
    }
}

/// Output-callback side: mixes active voices into the output block
pub struct PlaybackRenderer {
    commands: rtrb::Consumer<PlaybackCommand>,
    events: rtrb::Producer<PlaybackEvent>,
    retire: rtrb::Producer<Box<Voice>>,
    voices: Vec<Box<Voice>>,
    max_voices: usize,
}

impl PlaybackRenderer {
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Apply queued commands, then add every voice into `output`.
    pub fn process(&mut self, output: &mut [f32], channels: usize, block_start: Frame) {
        self.apply_commands();

        let channels = channels.max(1);
        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].render(output, channels, block_start) {
                let voice = self.voices.swap_remove(i);
                let _ = self.events.push(PlaybackEvent::Ended(voice.id));
                self.retire(voice);
            } else {
                i += 1;
            }
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                PlaybackCommand::Start(voice) => {
                    if self.voices.len() < self.max_voices {
                        self.voices.push(voice);
                    } else {
                        // over the voice limit; refuse rather than grow
                        self.retire(voice);
                    }
                }
                PlaybackCommand::Disconnect(id) => {
                    if let Some(pos) = self.voices.iter().position(|v| v.id == id) {
                        let voice = self.voices.swap_remove(pos);
                        self.retire(voice);
                    }
                }
                PlaybackCommand::DisconnectAll => {
                    while let Some(voice) = self.voices.pop() {
                        self.retire(voice);
                    }
                }
            }
        }
    }

    fn retire(&mut self, voice: Box<Voice>) {
        // a full queue drops here, on the audio thread; rare and bounded
        let _ = self.retire.push(voice);
    }
}

/// Create the queue pair for up to `max_voices` simultaneous sources
pub fn playback_channel(max_voices: usize) -> (PlaybackControl, PlaybackRenderer) {
    let (cmd_tx, cmd_rx) = playback_command_channel();
    let (evt_tx, evt_rx) = playback_event_channel();
    let (retire_tx, retire_rx) = retire_channel();
    (
        PlaybackControl {
            commands: cmd_tx,
            events: evt_rx,
            retired: retire_rx,
            next_id: 0,
        },
        PlaybackRenderer {
            commands: cmd_rx,
            events: evt_tx,
            retire: retire_tx,
            voices: Vec::with_capacity(max_voices.max(1)),
            max_voices: max_voices.max(1),
        },
    )
}
