use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tally_config::Config;
use tally_metrics::{AggregatorService, TcpCollector};
use tally_system::{Service, ShutdownHandle};
use tokio::task::JoinHandle;

use crate::listener::{self, UdpListener};

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding the UDP socket failed.
    #[error("could not bind udp socket to {0}")]
    BindFailed(String, #[source] io::Error),

    /// Creating the async runtime failed.
    #[error("could not create runtime")]
    Runtime(#[source] io::Error),

    /// Installing the termination signal handlers failed.
    #[error("could not listen for termination signals")]
    Signal(#[source] io::Error),

    /// The aggregator task panicked.
    #[error("metrics aggregator stopped unexpectedly")]
    AggregatorFailed,
}

/// Running services of the daemon.
#[derive(Debug)]
pub struct ServiceState {
    listen_addr: SocketAddr,
    aggregator: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
}

impl ServiceState {
    /// Binds the listen socket and starts the aggregator and all listeners.
    ///
    /// The aggregator flushes once more and stops when `shutdown` is notified.
    pub async fn start(config: &Config, shutdown: ShutdownHandle) -> Result<Self, ServerError> {
        let address = config.listen_addr();
        let socket = listener::bind(address)
            .await
            .map_err(|e| ServerError::BindFailed(address.to_owned(), e))?;
        let listen_addr = socket
            .local_addr()
            .map_err(|e| ServerError::BindFailed(address.to_owned(), e))?;

        let aggregator_config = config.aggregator_config();
        let collector = TcpCollector::new(config.collector_addr());
        let (aggregator_addr, aggregator) =
            AggregatorService::new(aggregator_config, collector, shutdown)
                .start(aggregator_config.queue_size);

        let socket = Arc::new(socket);
        let listeners = (0..config.listener_count())
            .map(|_| {
                UdpListener::new(
                    socket.clone(),
                    config.max_datagram_size(),
                    aggregator_addr.clone(),
                )
                .spawn()
            })
            .collect();

        tally_log::debug!(
            "started {} listeners, flushing every {}s to {}",
            config.listener_count(),
            aggregator_config.flush_interval,
            config.collector_addr(),
        );

        Ok(Self {
            listen_addr,
            aggregator,
            listeners,
        })
    }

    /// The local address of the listen socket.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Waits for the aggregator to complete its final flush, then stops all listeners.
    pub async fn join(self) -> Result<(), ServerError> {
        let result = self.aggregator.await;

        for listener in self.listeners {
            listener.abort();
        }

        result.map_err(|_| ServerError::AggregatorFailed)
    }
}
