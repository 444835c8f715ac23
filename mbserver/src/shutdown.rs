use tokio::sync::watch;

use crate::error::Shutdown;

/// Owning end of the server's shutdown signal
///
/// The signal fires when [`ShutdownSignal::trigger`] is called or when this value is dropped.
#[derive(Debug)]
pub(crate) struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

/// Task side of the shutdown signal
#[derive(Clone, Debug)]
pub(crate) struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub(crate) fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn trigger(&self) {
        // send_replace succeeds even when no task is listening
        self.tx.send_replace(true);
    }
}

impl ShutdownListener {
    /// Resolves once the signal has fired. Cancel safe, so it can be used in `select!`.
    pub(crate) async fn wait(&mut self) -> Shutdown {
        loop {
            if *self.rx.borrow_and_update() {
                return Shutdown;
            }
            if self.rx.changed().await.is_err() {
                // the sender is gone
                return Shutdown;
            }
        }
    }
}
