use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// An error when [sending](Addr::send) a message to a service fails.
///
/// This only happens once the service has stopped and dropped its [`Receiver`].
#[derive(Clone, Copy, Debug)]
pub struct SendError;

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to send message to service")
    }
}

impl std::error::Error for SendError {}

/// The address of a [`Service`].
///
/// The address allows to [send](Addr::send) messages to the service as long as the service is
/// running. It can be freely cloned, every clone feeds into the same bounded queue.
#[derive(Debug)]
pub struct Addr<I> {
    tx: mpsc::Sender<I>,
}

// Manually derive clone since we do not require `I: Clone`.
impl<I> Clone for Addr<I> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<I> Addr<I> {
    /// Sends a message to the service.
    ///
    /// If the queue of the service is full, this waits until the service has drained enough
    /// messages. Messages are never dropped because of a full queue, instead the backpressure
    /// propagates to the caller.
    pub async fn send<M>(&self, message: M) -> Result<(), SendError>
    where
        M: Into<I>,
    {
        self.tx.send(message.into()).await.map_err(|_| SendError)
    }

    /// Returns the number of messages that can be queued before [`send`](Self::send) waits.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Inbound channel for messages sent through an [`Addr`].
#[derive(Debug)]
pub struct Receiver<I> {
    rx: mpsc::Receiver<I>,
}

impl<I> Receiver<I> {
    /// Receives the next message.
    ///
    /// Returns `None` once all [`Addr`] instances have been dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<I> {
        self.rx.recv().await
    }
}

/// Creates a bounded channel for a service with room for `capacity` messages.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn channel<I>(capacity: usize) -> (Addr<I>, Receiver<I>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Addr { tx }, Receiver { rx })
}

/// A long-running task that exclusively owns its state.
///
/// Services receive messages from a bounded inbox and handle them one by one. All interaction
/// with the state of a service happens through its [`Addr`], so the state itself never needs
/// locking.
pub trait Service: Sized {
    /// The message type accepted by this service.
    type Interface: Send + 'static;

    /// Spawns a task to handle the messages of this service.
    ///
    /// The returned handle resolves once the service has stopped.
    fn spawn_handler(self, rx: Receiver<Self::Interface>) -> JoinHandle<()>;

    /// Starts this service with an inbox of the given capacity.
    ///
    /// Returns the address to send messages and a handle that resolves when the service stops.
    fn start(self, capacity: usize) -> (Addr<Self::Interface>, JoinHandle<()>) {
        let (addr, rx) = channel(capacity);
        let handle = self.spawn_handler(rx);
        (addr, handle)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct Echo;

    impl Service for Echo {
        type Interface = u32;

        fn spawn_handler(self, mut rx: Receiver<u32>) -> JoinHandle<()> {
            tokio::spawn(async move {
                // Never drains the inbox until told to.
                tokio::time::sleep(Duration::from_secs(3600)).await;
                while rx.recv().await.is_some() {}
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_waits_when_full() {
        let (addr, _handle) = Echo.start(2);

        addr.send(1u32).await.unwrap();
        addr.send(2u32).await.unwrap();
        assert_eq!(addr.capacity(), 0);

        let blocked = tokio::time::timeout(Duration::from_secs(1), addr.send(3u32)).await;
        assert!(blocked.is_err(), "send must wait for capacity instead of dropping");
    }

    #[tokio::test]
    async fn test_send_after_stop() {
        let (addr, rx) = channel::<u32>(1);
        drop(rx);
        assert!(addr.send(1u32).await.is_err());
    }
}
