use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use overdub::audio::engine;
use overdub::config::EngineConfig;
use overdub::project::export::WavExporter;
use overdub::project::import::read_wav_mono;
use overdub::{PlaybackRequest, Session};

const PUMP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "overdub", version, about = "Punch-in tape recorder with a sample-accurate click")]
struct Cli {
    /// JSON engine configuration; defaults apply to missing fields
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the click tempo
    #[arg(long, global = true)]
    bpm: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Roll the tape, record one track and export it
    Record {
        /// Track to record into; the next unused track if omitted
        #[arg(long)]
        track: Option<usize>,
        /// Tape time to start rolling from, in seconds
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        /// Seconds to roll
        #[arg(long, default_value_t = 10.0)]
        duration: f64,
        /// Punch-in point; defaults to the start point
        #[arg(long)]
        punch_in: Option<f64>,
        #[arg(long)]
        punch_out: Option<f64>,
        /// WAV to load into track 1 and play along with
        #[arg(long)]
        backing: Option<PathBuf>,
        /// Directory for the exported take
        #[arg(long, default_value = "takes")]
        out: PathBuf,
    },
    /// Run the click on its own
    Click {
        #[arg(long, default_value_t = 8.0)]
        seconds: f64,
    },
}

fn load_config(cli: &Cli) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(bpm) = cli.bpm {
        config.click.bpm = bpm;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Record {
            track,
            from,
            duration,
            punch_in,
            punch_out,
            backing,
            out,
        } => record(config, track, from, duration, punch_in, punch_out, backing, out),
        Command::Click { seconds } => click(config, seconds),
    }
}

#[allow(clippy::too_many_arguments)]
fn record(
    config: EngineConfig,
    track: Option<usize>,
    from: f64,
    duration: f64,
    punch_in: Option<f64>,
    punch_out: Option<f64>,
    backing: Option<PathBuf>,
    out: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let sample_rate = config.sample_rate;
    let (mut session, output, input) = Session::new(config)?;

    if let Some(path) = backing {
        let audio = read_wav_mono(&path)?;
        if audio.sample_rate != sample_rate {
            log::warn!(
                "{} is {} Hz but the engine runs at {} Hz; it will play at the wrong speed",
                path.display(),
                audio.sample_rate,
                sample_rate
            );
        }
        let frames = session.transport_mut().load_track(0, &audio.samples)?;
        log::info!("Loaded {} frames of backing from {}", frames, path.display());
    }

    let armed = session.transport_mut().arm(track)?;
    let streams = engine::start(sample_rate, output, input)?;
    if !streams.has_input() {
        log::warn!("Rolling without an input device; the take will be silent");
    }

    let punch_in = punch_in.unwrap_or(from);
    let stop = from + duration;
    let mut request = PlaybackRequest::from_secs(from).until(stop).punch_in(punch_in);
    if let Some(secs) = punch_out {
        request = request.punch_out(secs);
    }
    session.transport_mut().start_playback(request)?;

    let end = session.transport_mut().wait_for_end();
    let stopped = loop {
        session.pump();
        if let Some(event) = end.try_wait() {
            break event;
        }
        thread::sleep(PUMP_INTERVAL);
    };
    log::info!("Stopped at {:.3}s", stopped.tape_time_secs);

    let take_end = punch_out.unwrap_or(stop);
    let mut exporter = WavExporter::new(out);
    let handle = session
        .transport()
        .export_slice(armed, punch_in, take_end, &mut exporter)?;
    let stats = session.transport_mut().track_statistics(armed)?;
    println!("{}", handle.path.display());
    println!("{}", serde_json::to_string_pretty(&stats)?);

    session.shutdown()?;
    drop(streams);
    Ok(())
}

fn click(config: EngineConfig, seconds: f64) -> Result<(), Box<dyn std::error::Error>> {
    let sample_rate = config.sample_rate;
    let (bpm, beats) = (config.click.bpm, config.click.beats_per_measure);
    let (mut session, output, input) = Session::new(config)?;
    let streams = engine::start(sample_rate, output, input)?;

    session.click().start(None)?;
    log::info!("Click at {} bpm in {}/4 for {:.1}s", bpm, beats, seconds);

    let run_for = Duration::try_from_secs_f64(seconds)
        .map_err(|e| format!("invalid --seconds {}: {}", seconds, e))?;
    let deadline = Instant::now() + run_for;
    while Instant::now() < deadline {
        session.pump();
        thread::sleep(PUMP_INTERVAL);
    }
    log::debug!("Click stopped after {:.1} beats", seconds * bpm / 60.0);

    session.shutdown()?;
    drop(streams);
    Ok(())
}
