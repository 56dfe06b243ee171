//! brains command-line interpreter.
//!
//! Usage:
//!   brains [-q N | -Q N] file ...
//!
//! `-q` selects process-fair scheduling, `-Q` thread-fair; `N` is the
//! quantum, attached (`-q10`) or as the next argument. Quantum 0 runs
//! each thread until it suspends; a negative quantum draws a random one
//! per slice. Set `RUST_LOG=trace` for a per-instruction trace.

use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use brains::{Config, LoadError, Policy, Session};

const USAGE: &str = "usage: brains [-qQ i] files ...";

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    let (config, files) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let session = Session::with_config(config);
    for file in &files {
        match session.run_file(Path::new(file)) {
            Ok(()) => {}
            Err(e @ LoadError::Open { .. }) => eprintln!("{e}"),
            Err(e @ LoadError::Compile { .. }) => eprintln!("err: {e}"),
        }
    }
    ExitCode::SUCCESS
}

fn parse_args(args: &[String]) -> Result<(Config, Vec<String>), String> {
    let mut config = Config {
        seed: clock_seed(),
        ..Config::default()
    };

    let first = &args[0];
    if !first.starts_with('-') {
        return Ok((config, args.to_vec()));
    }

    match first.as_bytes().get(1).copied() {
        Some(flag @ (b'q' | b'Q')) => {
            if flag == b'Q' {
                config.policy = Policy::ThreadFair;
            }
            let attached = &first[2..];
            let (quantum, files) = if attached
                .as_bytes()
                .first()
                .is_some_and(u8::is_ascii_digit)
            {
                (attached.parse::<i32>(), &args[1..])
            } else if let Some(next) = args.get(1) {
                (next.parse::<i32>(), &args[2..])
            } else {
                return Err(USAGE.into());
            };
            match quantum {
                Ok(q) => config.quantum = q,
                Err(_) => return Err(USAGE.into()),
            }
            Ok((config, files.to_vec()))
        }
        _ => Err(format!("unsupported option: \"{first}\"")),
    }
}

fn clock_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(1)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init();
}
