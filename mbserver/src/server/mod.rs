use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::Instrument;

use crate::decode::DecodeLevel;
use crate::server::request::RequestSender;
use crate::server::task::DispatchTask;
use crate::shutdown::ShutdownSignal;
use crate::tcp::server::ServerTask;
use crate::types::AddressMode;

pub(crate) mod dispatcher;
pub(crate) mod operation;
pub(crate) mod request;
pub(crate) mod store;
pub(crate) mod task;

// re-export to the public API
pub use dispatcher::Dispatcher;
pub use store::{RegisterBank, RegisterStore, SharedBank};

/// Tuning knobs shared by every listener of a [`Server`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Number of decoded requests that may wait for the dispatcher before transports block
    pub queue_capacity: usize,
    /// Maximum number of concurrent TCP sessions. Accepting one more closes the oldest.
    pub max_sessions: usize,
    /// How long a transport waits for the dispatcher to answer before dropping a request
    pub response_timeout: Duration,
    /// Treatment of requests that run past address 65535
    pub address_mode: AddressMode,
    /// Protocol decoding written to the log
    pub decode: DecodeLevel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            max_sessions: 100,
            response_timeout: Duration::from_secs(5),
            address_mode: AddressMode::Wrap,
            decode: DecodeLevel::nothing(),
        }
    }
}

/// A running Modbus server
///
/// Owns the register store, the shared request queue and its dispatcher task. Listeners
/// are attached with [`Server::listen_tcp`] and [`Server::listen_rtu`]; every one of them
/// feeds the same queue, so requests are executed one at a time in arrival order.
///
/// All tasks stop when [`Server::shutdown`] is called or when the `Server` is dropped.
/// Requests still waiting in the queue at that point are abandoned.
#[derive(Debug)]
pub struct Server {
    store: RegisterStore,
    sender: RequestSender,
    shutdown: ShutdownSignal,
    config: ServerConfig,
}

impl Server {
    /// Create a server with cleared registers and spawn its dispatcher task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: ServerConfig) -> Self {
        Self::spawn_with_store(RegisterStore::new(), config)
    }

    /// Create a server operating on an existing (possibly provisioned) store
    pub fn spawn_with_store(store: RegisterStore, config: ServerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shutdown = ShutdownSignal::new();
        let dispatcher = Dispatcher::new(store.clone(), config.address_mode, config.decode.app);
        let mut task = DispatchTask::new(dispatcher, rx, shutdown.listener());

        tokio::spawn(
            async move {
                task.run().await;
            }
            .instrument(tracing::info_span!("Modbus-Dispatcher")),
        );

        Self {
            store,
            sender: RequestSender::new(tx, config.response_timeout),
            shutdown,
            config,
        }
    }

    /// Bind a TCP listener and start accepting sessions on it.
    ///
    /// Returns the bound address, useful when binding to port 0.
    pub async fn listen_tcp(&self, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;

        let mut task = ServerTask::new(
            self.config.max_sessions,
            listener,
            self.sender.clone(),
            self.shutdown.listener(),
            self.config.decode,
        );

        tokio::spawn(
            async move { task.run().await }
                .instrument(tracing::info_span!("Modbus-Server-TCP", "listen" = ?local)),
        );

        tracing::info!("listening for TCP connections on {}", local);
        Ok(local)
    }

    /// Open a serial port and start serving RTU requests on it.
    ///
    /// Failing to open the port here is reported immediately. Once running, the port
    /// is reopened according to `retry` whenever it fails.
    #[cfg(feature = "serial")]
    pub fn listen_rtu(
        &self,
        path: &str,
        settings: crate::serial::SerialSettings,
        retry: Box<dyn crate::retry::RetryStrategy>,
    ) -> std::io::Result<()> {
        let serial = crate::serial::open(path, settings)?;

        let session = crate::serial::server::RtuSession::new(
            path,
            settings.frame_gap(),
            self.sender.clone(),
            self.shutdown.listener(),
            self.config.decode,
        );
        let mut task = crate::serial::server::RtuServerTask {
            port: path.to_string(),
            retry,
            settings,
            session,
        };

        tokio::spawn(
            async move {
                task.run(serial).await;
            }
            .instrument(tracing::info_span!("Modbus-Server-RTU", "port" = ?path)),
        );

        tracing::info!("serving RTU requests on {}", path);
        Ok(())
    }

    /// Handle on the register banks for out-of-band reads and writes
    ///
    /// Every bank has its own lock, shared with the dispatcher.
    pub fn store(&self) -> RegisterStore {
        self.store.clone()
    }

    /// Configuration the server was spawned with
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Stop every listener, session and the dispatcher
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }
}
