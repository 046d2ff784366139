//! Delivery of flushed batches to a time series collector.

use std::fmt;
use std::io;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// A downstream collector that receives flushed batches.
///
/// A new connection is opened for every flush that has data and closed when it is dropped.
#[async_trait]
pub trait Collector: fmt::Debug + Send + Sync + 'static {
    /// The connection returned by [`connect`](Self::connect).
    type Connection: CollectorConnection;

    /// Opens a connection to the collector.
    async fn connect(&self) -> io::Result<Self::Connection>;

    /// Returns the address of the collector for diagnostics.
    fn address(&self) -> &str;
}

/// An open connection to a [`Collector`].
#[async_trait]
pub trait CollectorConnection: Send {
    /// Writes the full payload to the collector.
    async fn send(&mut self, payload: &[u8]) -> io::Result<()>;
}

/// A Graphite collector reachable over the plaintext TCP protocol.
#[derive(Clone, Debug)]
pub struct TcpCollector {
    address: String,
}

impl TcpCollector {
    /// Creates a collector for the given `host:port` address.
    ///
    /// The address is resolved on every connection attempt.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Collector for TcpCollector {
    type Connection = TcpConnection;

    async fn connect(&self) -> io::Result<Self::Connection> {
        let stream = TcpStream::connect(self.address.as_str()).await?;
        Ok(TcpConnection { stream })
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// A connection opened by [`TcpCollector`].
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

#[async_trait]
impl CollectorConnection for TcpConnection {
    async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.stream.write_all(payload).await?;
        self.stream.shutdown().await
    }
}
