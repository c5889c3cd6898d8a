//! # Hawser Demos
//!
//! Runnable programs demonstrating the hawser networking framework.
//!
//! ## Running
//!
//! ```bash
//! cargo run --example echo_server -- --debug
//! cargo run --example echo_client -- --debug
//! cargo run --example udp_echo -- --debug
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

use std::io::Write;
use std::str::FromStr;

/// Installs the demo log format when `--debug` is given.
pub fn init_logging(debug: bool, log_level: &str) -> anyhow::Result<()> {
    let log_level = log::LevelFilter::from_str(log_level)?;
    if debug {
        env_logger::Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{} [{}] {} - {}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.level(),
                    chrono::Local::now().format("%H:%M:%S.%6f"),
                    record.args()
                )
            })
            .filter(None, log_level)
            .init();
    }
    Ok(())
}
