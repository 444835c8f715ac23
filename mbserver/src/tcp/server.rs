use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::common::frame::{Frame, FrameDisplay};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::server::request::{RequestSender, Source};
use crate::shutdown::ShutdownListener;
use crate::tcp::frame::MbapReader;

struct SessionTracker {
    max: usize,
    id: u64,
    sessions: BTreeMap<u64, mpsc::Sender<()>>,
}

#[derive(Clone)]
struct SessionTrackerWrapper {
    inner: Arc<Mutex<SessionTracker>>,
}

impl SessionTracker {
    fn new(max: usize) -> SessionTracker {
        Self {
            max: max.max(1),
            id: 0,
            sessions: BTreeMap::new(),
        }
    }

    fn get_next_id(&mut self) -> u64 {
        let ret = self.id;
        self.id += 1;
        ret
    }

    fn add(&mut self, sender: mpsc::Sender<()>) -> u64 {
        while self.sessions.len() >= self.max {
            // dropping the sender is what tells the session task to stop
            match self.sessions.pop_first() {
                Some((id, _)) => {
                    tracing::warn!("exceeded max connections, closing oldest session: {}", id)
                }
                None => break,
            }
        }

        let id = self.get_next_id();
        self.sessions.insert(id, sender);
        id
    }

    fn remove(&mut self, id: u64) {
        self.sessions.remove(&id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.len()
    }
}

impl SessionTrackerWrapper {
    fn new(max: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionTracker::new(max))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionTracker> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Accepts connections and spawns a session task for each one
pub(crate) struct ServerTask {
    listener: TcpListener,
    sender: RequestSender,
    tracker: SessionTrackerWrapper,
    shutdown: ShutdownListener,
    decode: DecodeLevel,
}

impl ServerTask {
    pub(crate) fn new(
        max_sessions: usize,
        listener: TcpListener,
        sender: RequestSender,
        shutdown: ShutdownListener,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            listener,
            sender,
            tracker: SessionTrackerWrapper::new(max_sessions),
            shutdown,
            decode,
        }
    }

    pub(crate) async fn run(&mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.wait() => {
                    tracing::info!("server shutdown");
                    return;
                }
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, addr)) => self.handle(socket, addr),
                        Err(err) => {
                            tracing::error!("error accepting connection: {}", err);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle(&self, socket: TcpStream, addr: SocketAddr) {
        let phys = PhysLayer::new_tcp(socket);
        let tracker = self.tracker.clone();
        let (tx, rx) = mpsc::channel(1);

        let id = self.tracker.lock().add(tx);

        tracing::info!("accepted connection {} from: {}", id, addr);

        let mut session = SessionTask::new(
            phys,
            addr,
            self.sender.clone(),
            rx,
            self.shutdown.clone(),
            self.decode,
        );

        tokio::spawn(
            async move {
                let err = session.run().await;
                tracing::info!("session closed: {}", err);
                tracker.lock().remove(id);
            }
            .instrument(tracing::info_span!("Session", "remote" = ?addr)),
        );
    }
}

/// Serves requests arriving on a single TCP connection, in order
pub(crate) struct SessionTask {
    phys: PhysLayer,
    reader: MbapReader,
    source: Source,
    sender: RequestSender,
    close: mpsc::Receiver<()>,
    shutdown: ShutdownListener,
    decode: DecodeLevel,
}

impl SessionTask {
    pub(crate) fn new(
        phys: PhysLayer,
        addr: SocketAddr,
        sender: RequestSender,
        close: mpsc::Receiver<()>,
        shutdown: ShutdownListener,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            phys,
            reader: MbapReader::new(),
            source: Source::Tcp(addr),
            sender,
            close,
            shutdown,
            decode,
        }
    }

    /// Runs until the connection fails, is evicted or the server shuts down
    pub(crate) async fn run(&mut self) -> RequestError {
        loop {
            if let Err(err) = self.run_one().await {
                return err;
            }
        }
    }

    async fn run_one(&mut self) -> Result<(), RequestError> {
        let frame = tokio::select! {
            frame = self.reader.next_frame(&mut self.phys, self.decode.physical) => {
                match frame {
                    Ok(frame) => Frame::Tcp(frame),
                    Err(err) => {
                        if let RequestError::BadFrame(err) = err {
                            tracing::warn!("closing connection after malformed frame: {}", err);
                        }
                        return Err(err);
                    }
                }
            }
            _ = self.close.recv() => {
                tracing::info!("evicted by a newer connection");
                return Err(RequestError::Shutdown);
            }
            _ = self.shutdown.wait() => {
                return Err(RequestError::Shutdown);
            }
        };

        if self.decode.frame.enabled() {
            tracing::info!("MBAP RX - {}", FrameDisplay::new(self.decode.frame, &frame));
        }

        let response = match self.sender.exchange(frame, &self.source).await? {
            Some(response) => response,
            None => return Ok(()),
        };

        if self.decode.frame.enabled() {
            tracing::info!("MBAP TX - {}", FrameDisplay::new(self.decode.frame, &response));
        }

        let bytes = response.encode()?;
        self.phys.write(&bytes, self.decode.physical).await?;
        Ok(())
    }
}
