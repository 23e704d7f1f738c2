//! oriel command-line client
//!
//! `oriel <ip>:<port> [--no-input] [--stats] [--audio <ring-samples>]`
//!
//! Exits 0 on a clean shutdown (interrupt, terminate, server close) and
//! non-zero on any failure path.

use std::fs::OpenOptions;
use std::net::TcpStream;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{bail, Context};
use nix::sys::signal::{signal, SigHandler, Signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use oriel::{Client, ClientConfig, HeadlessPresenter, ShutdownFlag, ShutdownReason};

static SHUTDOWN: AtomicU32 = AtomicU32::new(0);

extern "C" fn on_signal(_signum: i32) {
    // Async-signal-safe: a single relaxed store observed by the loop
    SHUTDOWN.store(ShutdownReason::Interrupt as u32, Ordering::Relaxed);
}

struct Args {
    address: String,
    forward_input: bool,
    collect_stats: bool,
    audio_ring_samples: usize,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let Some(address) = args.next() else {
        bail!("Usage: oriel <ip>:<port> [--no-input] [--stats] [--audio <ring-samples>]");
    };

    let mut parsed = Args {
        address,
        forward_input: true,
        collect_stats: false,
        audio_ring_samples: 0,
    };
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--no-input" => parsed.forward_input = false,
            "--stats" => parsed.collect_stats = true,
            "--audio" => {
                let value = args.next().context("--audio requires a ring size in samples")?;
                parsed.audio_ring_samples = value
                    .parse()
                    .ok()
                    .filter(|&samples| samples > 0)
                    .with_context(|| format!("invalid audio ring size \"{value}\""))?;
            }
            other => bail!("Unknown argument \"{other}\""),
        }
    }
    Ok(parsed)
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;

    let transport = TcpStream::connect(&args.address)
        .with_context(|| format!("failed to connect to {}", args.address))?;
    transport.set_nodelay(true).context("failed to set TCP_NODELAY")?;
    info!(address = %args.address, "Connected");

    let config = ClientConfig::builder()
        .forward_input(args.forward_input)
        .collect_stats(args.collect_stats)
        .audio_ring_samples(args.audio_ring_samples)
        .build();
    if let Err(issues) = config.validate() {
        bail!("invalid configuration: {}", issues.join("; "));
    }

    // Presentation is handled by the compositor integration; this binary
    // drives the stream headless, which still exercises decode, audio and
    // input end to end.
    let presenter = HeadlessPresenter::new().context("failed to create presenter")?;

    let flag = ShutdownFlag::new(&SHUTDOWN);
    let mut client = Client::new(transport, presenter, config.clone(), flag);

    if config.forward_input {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.uhid_node)
            .with_context(|| format!("failed to open {}", config.uhid_node.display()))?;
        client.attach_input(device).context("failed to register virtual input device")?;
    }

    #[cfg(feature = "playback")]
    if config.audio_ring_samples > 0 {
        client.set_engine_hook(Box::new(|feed| {
            oriel_audio::Playback::start(feed).map(|playback| Box::new(playback) as _)
        }));
    }

    // SAFETY: the handler only performs an atomic store.
    unsafe {
        signal(Signal::SIGINT, SigHandler::Handler(on_signal))
            .context("failed to install SIGINT handler")?;
        signal(Signal::SIGTERM, SigHandler::Handler(on_signal))
            .context("failed to install SIGTERM handler")?;
    }

    client.run().context("client loop failed")?;
    info!("Shut down cleanly");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
