//! plotkit: interactive client for the serial plotter.
//!
//! Reads commands from stdin, one per line:
//!
//! ```text
//! move X Y            line X1 Y1 X2 Y2     arc CX CY ANGLE
//! circle CX CY R      demo                 hilbert ORDER
//! read FILE.dxf       quit
//! ```

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use plotkit_runner::{
    ByteChannel, DxfDrawingSource, ReaderLines, RunnerError, RunnerResult, Session,
    SessionConfig, SessionIo, SessionMode, ShutdownReason, StdConsole, TcpChannel,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interactive serial plotter client
#[derive(Parser, Debug)]
#[command(name = "plotkit", version, about)]
struct Args {
    /// Listening mode: only print what the device sends
    #[arg(short = 'l', long = "listen")]
    listen: bool,

    /// Writing mode: send commands
    #[arg(short = 'w', long = "write")]
    write: bool,

    /// Full mode: send commands and print device output (default)
    #[arg(short = 'f', long = "full")]
    full: bool,

    /// UART bridge address (host:port)
    #[arg(short, long)]
    device: Option<String>,

    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Timeout for the first reply to a command, in milliseconds
    #[arg(long)]
    reply_timeout_ms: Option<u64>,

    /// Timeout for a running drawing, in milliseconds
    #[arg(long)]
    drawing_timeout_ms: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Argument error: {}", e);
            return ExitCode::from(2);
        }
    };

    let channel = match TcpChannel::connect(&config.device, CONNECT_TIMEOUT) {
        Ok(channel) => channel,
        Err(source) => {
            let err = RunnerError::ChannelOpen {
                address: config.device.clone(),
                source,
            };
            eprintln!("{}", err);
            return ExitCode::from(2);
        }
    };
    println!("Connected to {}", channel.describe());

    let io = SessionIo {
        input: Box::new(ReaderLines::new(BufReader::new(io::stdin()))),
        console: Arc::new(StdConsole),
        drawings: Arc::new(DxfDrawingSource),
    };
    let session = match Session::start(config, Box::new(channel), io) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    let signal = session.signal();
    if let Err(e) = ctrlc::set_handler(move || {
        signal.trigger(ShutdownReason::Interrupted);
    }) {
        warn!(error = %e, "could not install interrupt handler");
    }

    let reason = session.run();
    if reason.is_fault() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_config(args: &Args) -> RunnerResult<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_yaml_file(path)?,
        None => SessionConfig::default(),
    };
    if args.listen || args.write || args.full {
        config.mode = SessionMode::from_flags(args.listen, args.write, args.full)?;
    }
    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if let Some(ms) = args.reply_timeout_ms {
        config.reply_timeout_ms = ms;
    }
    if let Some(ms) = args.drawing_timeout_ms {
        config.drawing_timeout_ms = ms;
    }
    Ok(config)
}
