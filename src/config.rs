use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Result, TapeError};

/// Engine configuration, loaded from JSON. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub capture_batch_frames: usize,
    pub max_duration_secs: f64,
    pub max_tracks: usize,
    /// Positive values shift captured audio earlier on tape
    pub latency_compensation_secs: f64,
    pub transport_lead_secs: f64,
    pub click: ClickConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub bpm: f64,
    pub beats_per_measure: u32,
    pub level: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            capture_batch_frames: CAPTURE_BATCH_FRAMES,
            max_duration_secs: MAX_DURATION_SECS,
            max_tracks: MAX_TRACKS,
            latency_compensation_secs: 0.0,
            transport_lead_secs: TRANSPORT_LEAD_SECS,
            click: ClickConfig::default(),
        }
    }
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beats_per_measure: DEFAULT_BEATS_PER_MEASURE,
            level: DEFAULT_CLICK_LEVEL,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(TapeError::Config("sample_rate must be non-zero".into()));
        }
        if self.capture_batch_frames == 0 {
            return Err(TapeError::Config("capture_batch_frames must be non-zero".into()));
        }
        if !(self.max_duration_secs > 0.0) {
            return Err(TapeError::Config("max_duration_secs must be positive".into()));
        }
        if !(self.transport_lead_secs >= 0.0) {
            return Err(TapeError::Config("transport_lead_secs must not be negative".into()));
        }
        if !self.latency_compensation_secs.is_finite() {
            return Err(TapeError::Config("latency_compensation_secs must be finite".into()));
        }
        if self.click.beats_per_measure == 0 {
            return Err(TapeError::Config("beats_per_measure must be non-zero".into()));
        }
        if !(self.click.bpm > 0.0) {
            return Err(TapeError::Config("bpm must be positive".into()));
        }
        Ok(())
    }

    /// Frames per track buffer
    pub fn track_capacity(&self) -> usize {
        (self.max_duration_secs * self.sample_rate as f64).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_five_minutes() {
        let config = EngineConfig::default();
        assert_eq!(config.track_capacity(), 14_400_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "sample_rate": 44100, "click": { "bpm": 90.0 } }"#).unwrap();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.click.bpm, 90.0);
        assert_eq!(config.click.beats_per_measure, DEFAULT_BEATS_PER_MEASURE);
        assert_eq!(config.capture_batch_frames, CAPTURE_BATCH_FRAMES);
    }

    #[test]
    fn rejects_zero_beats_per_measure() {
        let mut config = EngineConfig::default();
        config.click.beats_per_measure = 0;
        assert!(matches!(config.validate(), Err(TapeError::Config(_))));
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "latency_compensation_secs": 0.012 }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.latency_compensation_secs, 0.012);
    }
}
