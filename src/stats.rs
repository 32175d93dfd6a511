use serde::Serialize;

/// Linear amplitude to decibels full scale. Silence maps to `-inf`.
#[inline]
pub fn to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.log10()
}

/// Running sum-of-squares and peak accumulator
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelMeter {
    sum_sq: f64,
    count: usize,
    peak: f32,
    peak_index: usize,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.sum_sq += (sample as f64) * (sample as f64);
        let abs = sample.abs();
        if abs > self.peak {
            self.peak = abs;
            self.peak_index = self.count;
        }
        self.count += 1;
    }

    pub fn rms(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum_sq / self.count as f64).sqrt() as f32
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Position of the first sample that reached the peak
    pub fn peak_index(&self) -> usize {
        self.peak_index
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Derived per-track statistics, all in dBFS
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackStatistics {
    pub peak_db: f32,
    pub rms_db: f32,
    /// Loudest RMS over any contiguous window of [`crate::constants::RMS_WINDOW_SECS`]
    pub max_window_rms_db: f32,
}

impl TrackStatistics {
    pub fn silent() -> Self {
        Self {
            peak_db: f32::NEG_INFINITY,
            rms_db: f32::NEG_INFINITY,
            max_window_rms_db: f32::NEG_INFINITY,
        }
    }

    pub fn compute(samples: &[f32], window_frames: usize) -> Self {
        let mut meter = LevelMeter::new();
        for &s in samples {
            meter.push(s);
        }
        Self {
            peak_db: to_db(meter.peak()),
            rms_db: to_db(meter.rms()),
            max_window_rms_db: to_db(max_window_rms(samples, window_frames)),
        }
    }

    /// Same result as [`TrackStatistics::compute`] over `recorded` followed
    /// by `silent_tail` zeros, without scanning the zeros.
    pub fn compute_with_silent_tail(
        recorded: &[f32],
        silent_tail: usize,
        window_frames: usize,
    ) -> Self {
        let total = recorded.len() + silent_tail;
        if total == 0 {
            return Self::silent();
        }
        let mut meter = LevelMeter::new();
        for &s in recorded {
            meter.push(s);
        }

        // zeros never raise a window's energy, so the loudest window either
        // lies inside the recorded part or covers all of it
        let window = window_frames.clamp(1, total);
        let window_rms = if recorded.len() >= window {
            max_window_rms(recorded, window)
        } else {
            (meter.sum_sq / window as f64).sqrt() as f32
        };

        Self {
            peak_db: to_db(meter.peak()),
            rms_db: to_db((meter.sum_sq / total as f64).sqrt() as f32),
            max_window_rms_db: to_db(window_rms),
        }
    }
}

/// Maximum RMS over every contiguous window of `window` frames.
///
/// Buffers shorter than the window are measured whole.
pub fn max_window_rms(samples: &[f32], window: usize) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let window = window.clamp(1, samples.len());

    let mut sum_sq: f64 = samples[..window].iter().map(|&s| (s as f64) * (s as f64)).sum();
    let mut best = sum_sq;
    for i in window..samples.len() {
        let incoming = samples[i] as f64;
        let outgoing = samples[i - window] as f64;
        sum_sq = (sum_sq + incoming * incoming - outgoing * outgoing).max(0.0);
        if sum_sq > best {
            best = sum_sq;
        }
    }
    (best / window as f64).sqrt() as f32
}
