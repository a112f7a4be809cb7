// SPDX-License-Identifier: MPL-2.0
//! Command-line probe: prints duration and replay gain for a media file,
//! optionally decoding it through to count frames.

use media_spool::pipeline::{self, DecodeStep, MediaSession, SessionOptions};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = pico_args::Arguments::from_env();
    let decode_through = args.contains("--decode");
    let path = match args
        .finish()
        .into_iter()
        .next()
        .and_then(|s| s.into_string().ok())
    {
        Some(path) => path,
        None => {
            eprintln!("usage: probe [--decode] <media-file>");
            return ExitCode::FAILURE;
        }
    };

    let info = match pipeline::probe(&path) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("{path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("duration: {:.3} s", info.duration_secs);
    println!(
        "replay gain: {:.2} dB (factor {:.3})",
        info.replay_gain_decibels, info.replay_gain_factor
    );

    if decode_through {
        match decode_all(&path) {
            Ok(packets) => println!("decoded packets: {packets}"),
            Err(e) => {
                eprintln!("{path}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

/// Drives the probe decode loop to end of stream, counting packets.
fn decode_all(path: &str) -> media_spool::Result<u64> {
    let mut session = MediaSession::probe(path, &SessionOptions::default())?;
    let mut packets = 0u64;
    while session.decode_one_frame()? == DecodeStep::Continue {
        packets += 1;
    }
    Ok(packets)
}
