//! Handoff Player - MP3 files through the block handoff to a fixed-rate output
//!
//! This is the command line entry point. It:
//! 1. Starts the output (cpal device or clocked thread) with the consumer half
//! 2. Runs the decode driver on its own thread with the producer half
//! 3. Logs a status line until every source has been played
//!
//! Files given on the command line play first. With no files (or `--stdin`),
//! paths typed on stdin, one per line, are queued after them.

mod config;
mod output;

use std::io::BufRead;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use handoff_core::config::load_config;
use handoff_core::decode::{
    source_queue, DriverSummary, MpegDecoder, Playlist, SourceQueue, SourceSender, SourceSpec,
};
use handoff_core::handoff::{block_channel, HandoffStats};

use config::PlayerConfig;
use output::{list_output_devices, start_output, DeviceId, OutputBackend, OutputHandle};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "handoff-player")]
#[command(about = "Plays MP3 files through a lock-free block handoff")]
#[command(version)]
struct Args {
    /// Files to play, in order
    files: Vec<PathBuf>,

    /// Loop the file list forever
    #[arg(short, long)]
    repeat: bool,

    /// Config file (default: ~/.config/handoff-player/config.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tick a clocked thread instead of a sound card
    #[arg(long)]
    null_output: bool,

    /// Record the output to a WAV file (implies --null-output)
    #[arg(long, value_name = "WAV")]
    record: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Output device, as "[HOST] name" or just a name
    #[arg(short, long)]
    device: Option<String>,

    /// Keep reading paths from stdin after the files
    #[arg(long)]
    stdin: bool,

    /// Output sample rate in Hz
    #[arg(short, long, value_name = "HZ")]
    sample_rate: Option<u32>,

    /// Device buffer size in frames (default: host default)
    #[arg(short, long, value_name = "FRAMES")]
    buffer_frames: Option<u32>,
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let config = apply_args(load_config(&config_path), &args);

    if args.list_devices {
        for device in list_output_devices(config.output.sample_rate)? {
            println!("{}", device);
        }
        return Ok(());
    }

    log::info!("handoff-player starting up");

    let (producer, consumer) = block_channel(config.core.block_frames());
    let stats = producer.stats();
    let read_stdin = reads_stdin(&args, config.playback.repeat)?;
    let output = start_output(&config.output, consumer).context("Failed to start output")?;
    match &output {
        OutputHandle::Device(device) => log::info!(
            "Playing on {} at {}Hz ({} channels, {:?})",
            device.device_name(),
            device.sample_rate(),
            device.channels(),
            device.format()
        ),
        OutputHandle::Clocked { .. } => {
            log::info!("Clocked output running at {}Hz", output.sample_rate())
        }
    }

    let (sender, stdin_queue) = source_queue(config.playback.queue_capacity);
    let files: Vec<SourceSpec> = args.files.iter().map(SourceSpec::path).collect();
    if read_stdin {
        log::info!("Reading paths from stdin");
        spawn_stdin_reader(sender)?;
    } else {
        // Dropping the sender lets the stdin queue end right away
        drop(sender);
    }
    let queue = Playlist::new(files)
        .with_looping(config.playback.repeat)
        .chain(stdin_queue);

    let driver = config.core.build_driver(MpegDecoder::new(), producer);
    let decode = std::thread::Builder::new()
        .name("handoff-decode".to_string())
        .spawn(move || {
            let mut driver = driver;
            let mut queue = queue;
            driver.run(&mut queue)
        })
        .context("Failed to spawn decode thread")?;

    let summary = report_until_done(decode, &stats, config.playback.status_interval_secs)?;
    if summary.disconnected {
        log::warn!("Output went away before decoding finished");
    }

    // Let the output play the last block before stopping it
    let tail = config.core.block_frames() as f64 / output.sample_rate() as f64;
    std::thread::sleep(Duration::from_secs_f64(tail) + Duration::from_millis(50));
    shutdown(output);

    log::info!(
        "Played {} sources ({} unavailable, {} failed): {}",
        summary.sessions,
        summary.unavailable,
        summary.failed,
        stats.snapshot()
    );
    Ok(())
}

/// Command line flags override the config file
fn apply_args(mut config: PlayerConfig, args: &Args) -> PlayerConfig {
    if args.repeat {
        config.playback.repeat = true;
    }
    if let Some(device) = &args.device {
        config.output = config.output.with_device(DeviceId::parse(device));
    }
    if let Some(rate) = args.sample_rate {
        config.output = config.output.with_sample_rate(rate);
    }
    if let Some(frames) = args.buffer_frames {
        config.output = config.output.with_buffer_frames(frames);
    }
    if args.null_output {
        config.output.backend = OutputBackend::Clocked;
    }
    if let Some(path) = &args.record {
        config.output = config.output.with_record(path.clone());
    }
    config
}

/// Whether paths typed on stdin get played
///
/// A looping file list never ends, so nothing queued after it would play.
fn reads_stdin(args: &Args, repeat: bool) -> Result<bool> {
    if args.files.is_empty() {
        return Ok(true);
    }
    if args.stdin && repeat {
        anyhow::bail!("--stdin cannot be combined with a repeating file list");
    }
    Ok(args.stdin)
}

/// Queue every non-empty stdin line as a source
fn spawn_stdin_reader(mut sender: SourceSender) -> Result<()> {
    std::thread::Builder::new()
        .name("handoff-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let path = line.trim();
                if path.is_empty() {
                    continue;
                }
                match sender.send(SourceSpec::path(path)) {
                    Ok(()) => log::info!("Queued {}", path),
                    Err(spec) => log::warn!("Queue full, dropping {}", spec.name),
                }
            }
        })
        .context("Failed to spawn stdin thread")?;
    Ok(())
}

/// Log handoff counters until the decode thread returns
fn report_until_done(
    decode: JoinHandle<DriverSummary>,
    stats: &HandoffStats,
    interval_secs: f64,
) -> Result<DriverSummary> {
    let poll = Duration::from_millis(100);
    let interval = Duration::try_from_secs_f64(interval_secs.max(0.0)).unwrap_or(Duration::MAX);
    let mut last = stats.snapshot();
    let mut waited = Duration::ZERO;

    while !decode.is_finished() {
        std::thread::sleep(poll);
        waited += poll;
        if interval.is_zero() || waited < interval {
            continue;
        }
        waited = Duration::ZERO;

        let now = stats.snapshot();
        let delta = now.since(&last);
        if delta.underflows > 0 {
            log::warn!("{}", delta);
        } else {
            log::info!("{}", delta);
        }
        last = now;
    }

    decode
        .join()
        .map_err(|_| anyhow::anyhow!("Decode thread panicked"))
}

fn shutdown(output: OutputHandle) {
    if let OutputHandle::Clocked { register, .. } = &output {
        log::debug!(
            "Codec register: last word {:#010x} after {} writes",
            register.word(),
            register.writes()
        );
    }
    output.stop();
    log::info!("Output stopped");
}
