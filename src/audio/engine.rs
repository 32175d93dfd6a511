use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::audio::capture::CaptureProcessor;
use crate::audio::click::ClickGenerator;
use crate::audio::playback::PlaybackRenderer;
use crate::clock::FrameClock;
use crate::error::{Result, TapeError};

const OUTPUT_CHANNELS: u16 = 2;
const INPUT_CHANNELS: u16 = 1;

/// Everything the output callback owns. The callback is the only writer of
/// the frame clock.
pub struct OutputGraph {
    pub clock: FrameClock,
    pub click: ClickGenerator,
    pub renderer: PlaybackRenderer,
}

impl OutputGraph {
    /// Render one interleaved block and advance the clock past it
    pub fn process(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let block_start = self.clock.now();
        // click overwrites, playback adds on top
        self.click.process(data, channels, block_start);
        self.renderer.process(data, channels, block_start);
        for s in data.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
        self.clock.advance(data.len() / channels);
    }
}

/// Everything the input callback owns
pub struct InputGraph {
    pub clock: FrameClock,
    pub capture: CaptureProcessor,
}

impl InputGraph {
    pub fn process(&mut self, data: &[f32], channels: usize) {
        self.capture.process(data, channels, self.clock.now());
    }
}

/// Live device streams; audio stops when this is dropped
pub struct AudioStreams {
    _output: cpal::Stream,
    input: Option<cpal::Stream>,
}

impl AudioStreams {
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }
}

fn audio_err(e: impl std::fmt::Display) -> TapeError {
    TapeError::Audio(e.to_string())
}

/// Open the default devices and start both callbacks. A missing input
/// device is not fatal: playback and click still run.
pub fn start(
    sample_rate: u32,
    mut output: OutputGraph,
    mut input: InputGraph,
) -> Result<AudioStreams> {
    let host = cpal::default_host();

    let output_device = host
        .default_output_device()
        .ok_or_else(|| TapeError::Audio("No output device available".into()))?;

    let output_config = StreamConfig {
        channels: OUTPUT_CHANNELS,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let output_stream = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                output.process(data, OUTPUT_CHANNELS as usize);
            },
            |err| {
                log::error!("Audio output error: {}", err);
            },
            None,
        )
        .map_err(audio_err)?;
    output_stream.play().map_err(audio_err)?;

    let input_stream = match host.default_input_device() {
        Some(device) => {
            let input_config = StreamConfig {
                channels: INPUT_CHANNELS,
                sample_rate: SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };
            let stream = device.build_input_stream(
                &input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    input.process(data, INPUT_CHANNELS as usize);
                },
                |err| {
                    log::error!("Audio input error: {}", err);
                },
                None,
            );
            match stream {
                Ok(s) => {
                    s.play().map_err(audio_err)?;
                    Some(s)
                }
                Err(e) => {
                    log::warn!("Could not open input device: {}", e);
                    None
                }
            }
        }
        None => {
            log::warn!("No input device found; recording disabled");
            None
        }
    };

    log::info!(
        "Audio running at {} Hz ({} input)",
        sample_rate,
        if input_stream.is_some() { "with" } else { "without" }
    );

    Ok(AudioStreams {
        _output: output_stream,
        input: input_stream,
    })
}
