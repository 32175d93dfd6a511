pub const SAMPLE_RATE: u32 = 48_000;
/// Frames delivered per real-time callback on a typical host
pub const QUANTUM_FRAMES: usize = 128;
/// Frames accumulated before a capture batch is emitted (4 quanta)
pub const CAPTURE_BATCH_FRAMES: usize = 512;
/// Maximum recording duration in seconds
pub const MAX_DURATION_SECS: f64 = 300.0;
/// Upper bound on lazily created tracks
pub const MAX_TRACKS: usize = 64;
/// Channel capacity for inter-thread messages
pub const CHANNEL_CAPACITY: usize = 1024;
/// Capacity of the capture batch queue (about 5 s of audio at 48 kHz)
pub const CAPTURE_QUEUE_CAPACITY: usize = 512;
/// How far ahead of "now" a new tape-zero mapping is anchored
pub const TRANSPORT_LEAD_SECS: f64 = 0.1;
/// Window used for the windowed-RMS track statistic
pub const RMS_WINDOW_SECS: f64 = 2.0;

/// Click tick length in seconds
pub const CLICK_DURATION_SECS: f64 = 0.05;
pub const CLICK_ACCENT_HZ: f64 = 1900.0;
pub const CLICK_HZ: f64 = 1500.0;
pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_BEATS_PER_MEASURE: u32 = 4;
pub const DEFAULT_CLICK_LEVEL: f32 = 0.3;
