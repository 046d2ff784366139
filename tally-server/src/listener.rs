use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tally_log::LogError;
use tally_metrics::{AggregatorMessage, Sample};
use tally_system::{Addr, SendError};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Receives datagrams on a shared socket and forwards decoded samples to the aggregator.
///
/// Forwarding waits while the aggregator queue is full, during which no datagrams are read from
/// the socket.
#[derive(Debug)]
pub struct UdpListener {
    socket: Arc<UdpSocket>,
    buffer_size: usize,
    aggregator: Addr<AggregatorMessage>,
}

impl UdpListener {
    /// Creates a listener reading datagrams of up to `buffer_size` bytes.
    pub fn new(
        socket: Arc<UdpSocket>,
        buffer_size: usize,
        aggregator: Addr<AggregatorMessage>,
    ) -> Self {
        Self {
            socket,
            buffer_size,
            aggregator,
        }
    }

    /// Spawns the receive loop.
    ///
    /// The loop ends once the aggregator has stopped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut buffer = vec![0; self.buffer_size];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(error) => {
                    tally_log::warn!("error reading from socket: {}", LogError(&error));
                    continue;
                }
            };

            if self.forward(&buffer[..len], peer).await.is_err() {
                tally_log::debug!("metrics aggregator stopped, closing listener");
                return;
            }
        }
    }

    async fn forward(&self, datagram: &[u8], peer: SocketAddr) -> Result<(), SendError> {
        for result in Sample::parse_all(datagram) {
            match result {
                Ok(sample) => self.aggregator.send(sample).await?,
                Err(_) => tally_log::trace!("dropping malformed line from {peer}"),
            }
        }

        Ok(())
    }
}

/// Binds the UDP socket shared by all listeners.
pub async fn bind(address: &str) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(address).await?;
    tally_log::info!("listening on {}", socket.local_addr()?);
    Ok(socket)
}
