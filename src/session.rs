use crate::audio::bridge::CaptureBridge;
use crate::audio::capture::{CaptureProcessor, CaptureTelemetry};
use crate::audio::click::{ClickGenerator, ClickProxy, TempoSource};
use crate::audio::engine::{InputGraph, OutputGraph};
use crate::audio::mixer::PatchBay;
use crate::audio::playback::playback_channel;
use crate::audio::transport::TransportOrchestrator;
use crate::clock::FrameClock;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::messages::{capture_channel, click_channel};

use std::sync::Arc;

pub struct Session {
    config: EngineConfig,
    clock: FrameClock,
    bridge: CaptureBridge,
    transport: TransportOrchestrator,
    click: ClickProxy,
    telemetry: Arc<CaptureTelemetry>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<(Self, OutputGraph, InputGraph)> {
        config.validate()?;
        let sr = config.sample_rate;
        let clock = FrameClock::new();

        let (capture_tx, capture_rx) = capture_channel();
        let capture = CaptureProcessor::new(sr, config.capture_batch_frames, capture_tx);
        let telemetry = capture.telemetry();
        let mut bridge = CaptureBridge::new(capture_rx, sr, config.latency_compensation_secs)
            .with_telemetry(Arc::clone(&telemetry));

        let (click_tx, click_rx) = click_channel();
        let generator = ClickGenerator::new(sr, &config.click, click_rx);
        let click = ClickProxy::new(click_tx, sr, &config.click)?;

        let (control, renderer) = playback_channel(config.max_tracks);
        let mut transport =
            TransportOrchestrator::new(&config, clock.clone(), control, Box::new(PatchBay::new()));
        transport.attach_capture(&mut bridge);
        transport.subscribe(click.transport_subscriber());

        let output = OutputGraph {
            clock: clock.clone(),
            click: generator,
            renderer,
        };
        let input = InputGraph {
            clock: clock.clone(),
            capture,
        };

        let session = Self {
            config,
            clock,
            bridge,
            transport,
            click,
            telemetry,
        };
        Ok((session, output, input))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn transport(&self) -> &TransportOrchestrator {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TransportOrchestrator {
        &mut self.transport
    }

    pub fn click(&self) -> &ClickProxy {
        &self.click
    }

    pub fn set_latency_compensation(&mut self, secs: f64) {
        self.bridge.set_compensation_secs(secs);
    }

    pub fn sync_tempo(&self, source: &dyn TempoSource) -> Result<bool> {
        self.click.sync_tempo(source)
    }

    /// Capture batches emitted and dropped so far
    pub fn capture_counts(&self) -> (u64, u64) {
        (self.telemetry.emitted(), self.telemetry.dropped())
    }

    /// One control-loop step
    pub fn pump(&mut self) {
        self.bridge.pump();
        self.transport.poll();
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.pump();
        self.transport.shutdown()?;
        self.click.stop()
    }
}
