//! The tally daemon.
//!
//! Samples are received over UDP by one or more listener tasks sharing a socket. Listeners
//! decode every datagram and forward the samples to the metrics aggregator through a bounded
//! queue. The aggregator flushes to the Graphite collector in a fixed interval. On `SIGTERM` or
//! `SIGINT`, the aggregator flushes one final time and the process exits.
#![warn(missing_docs)]

mod listener;
mod service;

use tally_config::Config;
use tally_system::Controller;

pub use crate::listener::UdpListener;
pub use crate::service::{ServerError, ServiceState};

/// Runs the daemon until a termination signal is received.
///
/// This blocks the current thread. Failing to bind the listen socket is fatal and returns an
/// error before any sample is accepted.
pub fn run(config: Config) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("tally")
        .enable_all()
        .build()
        .map_err(ServerError::Runtime)?;

    runtime.block_on(async {
        let controller = Controller::new();
        let state = ServiceState::start(&config, controller.shutdown_handle()).await?;

        controller
            .run_until_signal()
            .await
            .map_err(ServerError::Signal)?;

        state.join().await
    })
}
