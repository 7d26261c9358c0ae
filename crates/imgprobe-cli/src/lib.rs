//! Shared plumbing for the imgprobe command-line tools.
//!
//! Standard output carries only the result; diagnostics go to stderr.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::EnvFilter;

pub mod config;

pub use config::Config;

/// Install the stderr logger. `RUST_LOG` picks the level; errors only by default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

/// Print `value` as one line of JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    write_json(&mut out, value)?;
    out.flush()?;
    Ok(())
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    Ok(())
}
