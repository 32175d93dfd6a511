use crate::audio::capture::SampleBatch;
use crate::audio::playback::{SourceId, Voice};
use crate::clock::Frame;
use crate::constants::{CAPTURE_QUEUE_CAPACITY, CHANNEL_CAPACITY};

/// Control → click generator. Applied at the next block boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickCommand {
    Set {
        bpm: f64,
        beats_per_measure: u32,
        level: f32,
    },
    /// Start ticking. `None` fires the first tick immediately.
    Start { anchor: Option<Frame> },
    Stop,
}

/// Control → playback renderer
#[derive(Debug)]
pub enum PlaybackCommand {
    /// Boxed so the queue slots stay small
    Start(Box<Voice>),
    Disconnect(SourceId),
    DisconnectAll,
}

/// Playback renderer → control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A source played through to its end frame
    Ended(SourceId),
}

pub fn click_channel() -> (rtrb::Producer<ClickCommand>, rtrb::Consumer<ClickCommand>) {
    rtrb::RingBuffer::new(CHANNEL_CAPACITY)
}

pub fn playback_command_channel() -> (
    rtrb::Producer<PlaybackCommand>,
    rtrb::Consumer<PlaybackCommand>,
) {
    rtrb::RingBuffer::new(CHANNEL_CAPACITY)
}

pub fn playback_event_channel() -> (rtrb::Producer<PlaybackEvent>, rtrb::Consumer<PlaybackEvent>)
{
    rtrb::RingBuffer::new(CHANNEL_CAPACITY)
}

/// Voices leaving the renderer are handed back so their buffers are
/// released on the control thread.
pub fn retire_channel() -> (rtrb::Producer<Box<Voice>>, rtrb::Consumer<Box<Voice>>) {
    rtrb::RingBuffer::new(CHANNEL_CAPACITY)
}

pub fn capture_channel() -> (rtrb::Producer<SampleBatch>, rtrb::Consumer<SampleBatch>) {
    rtrb::RingBuffer::new(CAPTURE_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_channel_round_trip() {
        let (mut tx, mut rx) = click_channel();
        tx.push(ClickCommand::Start { anchor: Some(480) }).unwrap();
        assert_eq!(rx.pop().unwrap(), ClickCommand::Start { anchor: Some(480) });
        assert!(rx.pop().is_err());
    }

    #[test]
    fn playback_command_stays_small() {
        let size = std::mem::size_of::<PlaybackCommand>();
        assert!(size <= 16, "PlaybackCommand is {} bytes, expected <= 16", size);
    }
}
