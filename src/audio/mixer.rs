use crate::audio::playback::SourceId;

/// Opaque handle to a mixer channel strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub usize);

/// Boundary to the mixer. The transport only routes sources into channel
/// strips; gain, pan and effects stay on the mixer's side.
pub trait Mixer: Send {
    fn patch(&mut self, source: SourceId, channel: usize) -> ChannelHandle;

    fn unpatch(&mut self, _source: SourceId) {}
}

/// Minimal mixer that only keeps the routing table
#[derive(Debug, Default)]
pub struct PatchBay {
    routes: Vec<(SourceId, usize)>,
}

impl PatchBay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel the source is routed to, if patched
    pub fn channel_of(&self, source: SourceId) -> Option<usize> {
        self.routes
            .iter()
            .find(|(id, _)| *id == source)
            .map(|&(_, ch)| ch)
    }

    pub fn patched_count(&self) -> usize {
        self.routes.len()
    }
}

impl Mixer for PatchBay {
    fn patch(&mut self, source: SourceId, channel: usize) -> ChannelHandle {
        self.routes.retain(|(id, _)| *id != source);
        self.routes.push((source, channel));
        ChannelHandle(channel)
    }

    fn unpatch(&mut self, source: SourceId) {
        self.routes.retain(|(id, _)| *id != source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::playback_channel;

    #[test]
    fn patch_and_unpatch_track_routes() {
        let (mut control, _renderer) = playback_channel(2);
        let a = control.next_id();
        let b = control.next_id();

        let mut bay = PatchBay::new();
        assert_eq!(bay.patch(a, 0), ChannelHandle(0));
        assert_eq!(bay.patch(b, 3), ChannelHandle(3));
        assert_eq!(bay.channel_of(b), Some(3));

        bay.unpatch(a);
        assert_eq!(bay.channel_of(a), None);
        assert_eq!(bay.patched_count(), 1);
    }
}
