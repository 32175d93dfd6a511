use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::error::{Result, TapeError};

/// A decoded WAV file, downmixed to mono
#[derive(Debug, Clone, PartialEq)]
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Read any PCM or float WAV as mono f32. Integer formats are normalised to
/// [-1, 1]; multichannel files are averaged down.
pub fn read_wav_mono(path: &Path) -> Result<MonoAudio> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / i8::MAX as f32))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Int, 24 | 32) => {
            let denom = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / denom))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        _ => {
            return Err(TapeError::Audio(format!(
                "Unsupported WAV format in {} ({}-bit {:?})",
                path.display(),
                spec.bits_per_sample,
                spec.sample_format
            )))
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        samples
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(MonoAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}
