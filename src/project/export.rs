use std::path::{Path, PathBuf};

use crate::error::Result;

/// What an exporter hands back for a finished export
#[derive(Debug, Clone, PartialEq)]
pub struct UploadHandle {
    pub name: String,
    pub path: PathBuf,
    pub frames: usize,
    pub sample_rate: u32,
}

impl UploadHandle {
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

/// File export collaborator. Only called on explicit export requests.
pub trait Exporter {
    fn export(&mut self, samples: &[f32], sample_rate: u32, name: &str) -> Result<UploadHandle>;
}

/// Writes each export as a 32-bit float mono WAV into a directory
pub struct WavExporter {
    dir: PathBuf,
}

impl WavExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Turn a display name into something safe to use as a file stem
fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "track".to_string()
    } else {
        stem.to_lowercase()
    }
}

impl Exporter for WavExporter {
    fn export(&mut self, samples: &[f32], sample_rate: u32, name: &str) -> Result<UploadHandle> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(format!("{}.wav", file_stem(name)));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for &s in samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;

        log::info!("Exported {} ({} frames) to {}", name, samples.len(), path.display());
        Ok(UploadHandle {
            name: name.to_string(),
            path,
            frames: samples.len(),
            sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_float_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = WavExporter::new(dir.path().join("out"));
        let handle = exporter.export(&[0.25, -0.5, 1.0], 48_000, "Track 1").unwrap();

        assert_eq!(handle.path, dir.path().join("out").join("track_1.wav"));
        assert_eq!(handle.frames, 3);

        let mut reader = hound::WavReader::open(&handle.path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn odd_names_become_safe_stems() {
        assert_eq!(file_stem("Lead Vox / take 2"), "lead_vox___take_2");
        assert_eq!(file_stem("   "), "track");
    }
}
