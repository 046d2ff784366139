use std::io;

use tokio::sync::watch;

/// Shutdown request sent by the [`Controller`] to subscribed services.
///
/// Services finish their current work, perform their final duties and stop. No deadline is
/// imposed on that work beyond what the involved transports enforce themselves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Shutdown;

/// Notifies a service about an upcoming shutdown.
///
/// Obtained from [`Controller::shutdown_handle`].
#[derive(Clone, Debug)]
pub struct ShutdownHandle(watch::Receiver<Option<Shutdown>>);

impl ShutdownHandle {
    /// Waits for the shutdown request.
    ///
    /// Resolves immediately if the shutdown was requested before this call. If the controller
    /// is dropped without requesting a shutdown, this never resolves.
    pub async fn notified(&mut self) -> Shutdown {
        loop {
            if let Some(shutdown) = *self.0.borrow_and_update() {
                return shutdown;
            }

            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Returns `true` if a shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.0.borrow().is_some()
    }
}

/// Broadcasts the shutdown of the process to all services.
///
/// Services obtain a [`ShutdownHandle`] and observe it next to their inbox. The controller itself
/// listens for termination signals in [`Controller::run_until_signal`].
#[derive(Debug)]
pub struct Controller {
    tx: watch::Sender<Option<Shutdown>>,
}

impl Controller {
    /// Creates a new controller without a pending shutdown.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Returns a handle to observe the shutdown of this controller.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.tx.subscribe())
    }

    /// Requests a shutdown of all services holding a [`ShutdownHandle`].
    pub fn shutdown(&self) {
        self.tx.send_replace(Some(Shutdown));
    }

    /// Waits for a termination signal and then requests the shutdown.
    ///
    /// Both `SIGTERM` and `SIGINT` (Ctrl+C) are handled.
    pub async fn run_until_signal(&self) -> io::Result<()> {
        wait_for_termination().await?;
        tally_log::info!("received termination signal, shutting down");
        self.shutdown();
        Ok(())
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
