use crate::audio::buffer::Track;
use crate::clock::Frame;

/// Result of a punch write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    pub written: usize,
    /// Samples discarded because they fell outside the track buffer
    pub clipped: usize,
}

/// Write `samples` so that `samples[0]` lands at tape frame `tape_frame`.
/// Anything before tape zero or past the buffer's capacity is discarded;
/// the buffer never grows or wraps.
pub fn write_clipped(track: &mut Track, tape_frame: Frame, samples: &[f32]) -> WriteOutcome {
    let capacity = track.capacity() as Frame;
    let end = tape_frame + samples.len() as Frame;
    let from = tape_frame.clamp(0, capacity);
    let to = end.clamp(0, capacity);

    if to <= from {
        return WriteOutcome {
            written: 0,
            clipped: samples.len(),
        };
    }

    let src = &samples[(from - tape_frame) as usize..(to - tape_frame) as usize];
    track.samples_mut()[from as usize..to as usize].copy_from_slice(src);
    track.mark_written(to as usize);

    WriteOutcome {
        written: src.len(),
        clipped: samples.len() - src.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_at_tape_offset() {
        let mut track = Track::new(0, 16);
        let out = write_clipped(&mut track, 4, &[1.0, 2.0, 3.0]);
        assert_eq!(out, WriteOutcome { written: 3, clipped: 0 });
        assert_eq!(&track.samples()[3..8], &[0.0, 1.0, 2.0, 3.0, 0.0]);
        assert_eq!(track.recorded_len(), 7);
    }

    #[test]
    fn clips_at_capacity() {
        let mut track = Track::new(0, 8);
        let out = write_clipped(&mut track, 6, &[1.0; 4]);
        assert_eq!(out, WriteOutcome { written: 2, clipped: 2 });
        assert_eq!(&track.samples()[6..], &[1.0, 1.0]);
    }

    #[test]
    fn clips_before_tape_zero() {
        let mut track = Track::new(0, 8);
        let out = write_clipped(&mut track, -2, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out.written, 2);
        assert_eq!(&track.samples()[..3], &[3.0, 4.0, 0.0]);
    }

    #[test]
    fn entirely_outside_is_a_no_op() {
        let mut track = Track::new(0, 8);
        let out = write_clipped(&mut track, 8, &[1.0; 4]);
        assert_eq!(out.written, 0);
        assert!(!track.has_data());
    }
}
