//! Helpers for testing the daemon and its services.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output is
//!    captured by the test runner. All logs emitted with [`tally_log`] will show up for test
//!    failures or when run with `--nocapture`.
//!
//! # Example
//!
//! ```no_run
//! #[test]
//! fn my_test() {
//!     tally_test::setup();
//!
//!     tally_log::debug!("hello, world!");
//! }
//! ```

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from this crate and mutes all other logs.
pub fn setup() {
    tally_log::init_test!();
}

/// A Graphite server on a local port that records every received payload.
///
/// Each accepted connection is read until the client closes it, and the full payload is
/// recorded as one entry.
#[derive(Debug)]
pub struct MockGraphite {
    address: SocketAddr,
    payloads: mpsc::UnboundedReceiver<String>,
    handle: JoinHandle<()>,
}

impl MockGraphite {
    /// Binds the server to a random local port and starts accepting connections.
    pub async fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let (tx, payloads) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut payload = String::new();
                    if socket.read_to_string(&mut payload).await.is_ok() && !payload.is_empty() {
                        tx.send(payload).ok();
                    }
                });
            }
        });

        Ok(Self {
            address,
            payloads,
            handle,
        })
    }

    /// The address the server listens on.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Waits for the next non-empty payload, up to `timeout`.
    pub async fn next_payload(&mut self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.payloads.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns a payload that has already been received, without waiting.
    pub fn try_next_payload(&mut self) -> Option<String> {
        self.payloads.try_recv().ok()
    }
}

impl Drop for MockGraphite {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
