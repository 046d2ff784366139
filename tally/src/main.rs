//! The tally daemon.
//!
//! `tally` receives counters, gauges and timers over UDP, aggregates them over a fixed flush
//! interval and writes the results to a Graphite collector.
//!
//! # Usage
//!
//! ```text
//! tally run --graphite 127.0.0.1:2003 --percent-threshold 90
//! ```
//!
//! Run `tally --help` for all options. Configuration is read from `.tally/config.yml` if it
//! exists, see [`tally_config`] for the file format.

mod cli;
mod setup;

use std::process;

#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            tally_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
