use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::common::frame::Frame;
use crate::error::Shutdown;

/// The transport a request arrived on
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Source {
    Tcp(std::net::SocketAddr),
    #[cfg_attr(not(feature = "serial"), allow(dead_code))]
    Serial(String),
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Source::Tcp(addr) => write!(f, "tcp {addr}"),
            Source::Serial(port) => write!(f, "serial {port}"),
        }
    }
}

/// A decoded frame plus the handle used to send its response back to the origin
#[derive(Debug)]
pub(crate) struct Request {
    pub(crate) frame: Frame,
    pub(crate) source: Source,
    pub(crate) reply: oneshot::Sender<Frame>,
}

/// Transport side of the shared request queue
#[derive(Clone, Debug)]
pub(crate) struct RequestSender {
    tx: mpsc::Sender<Request>,
    timeout: Duration,
}

impl RequestSender {
    pub(crate) fn new(tx: mpsc::Sender<Request>, timeout: Duration) -> Self {
        Self { tx, timeout }
    }

    /// Enqueue a request and wait for the dispatcher's response
    ///
    /// Returns `Ok(None)` if no response arrived within the timeout, in which case
    /// the request is dropped. The dispatcher going away means the server is shutting down.
    pub(crate) async fn exchange(
        &self,
        frame: Frame,
        source: &Source,
    ) -> Result<Option<Frame>, Shutdown> {
        let (reply, rx) = oneshot::channel();
        let request = Request {
            frame,
            source: source.clone(),
            reply,
        };

        let exchange = async {
            self.tx.send(request).await.map_err(|_| Shutdown)?;
            rx.await.map_err(|_| Shutdown)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result.map(Some),
            Err(_) => {
                tracing::warn!(
                    "no response to request from {} within {:?}",
                    source,
                    self.timeout
                );
                Ok(None)
            }
        }
    }
}
