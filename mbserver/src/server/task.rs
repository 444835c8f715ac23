use tokio::sync::mpsc;

use crate::error::Shutdown;
use crate::server::dispatcher::Dispatcher;
use crate::server::request::Request;
use crate::shutdown::ShutdownListener;

/// Single consumer of the request queue
///
/// Requests are dispatched one at a time in the order they were enqueued.
pub(crate) struct DispatchTask {
    dispatcher: Dispatcher,
    rx: mpsc::Receiver<Request>,
    shutdown: ShutdownListener,
}

impl DispatchTask {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        rx: mpsc::Receiver<Request>,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            dispatcher,
            rx,
            shutdown,
        }
    }

    pub(crate) async fn run(&mut self) -> Shutdown {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => {
                    tracing::info!("dispatcher shutdown");
                    return Shutdown;
                }
                request = self.rx.recv() => match request {
                    Some(request) => self.dispatcher.process(request),
                    // every transport is gone
                    None => return Shutdown,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use super::*;
    use crate::common::frame::{register_count_payload, Frame};
    use crate::decode::AppDecodeLevel;
    use crate::server::request::{RequestSender, Source};
    use crate::server::store::RegisterStore;
    use crate::shutdown::ShutdownSignal;
    use crate::tcp::frame::TcpFrame;
    use crate::types::{AddressMode, UnitId};

    fn source() -> Source {
        Source::Tcp(SocketAddr::from(([127, 0, 0, 1], 5020)))
    }

    fn spawn(
        store: RegisterStore,
    ) -> (RequestSender, ShutdownSignal, tokio::task::JoinHandle<Shutdown>) {
        let (tx, rx) = mpsc::channel(4);
        let signal = ShutdownSignal::new();
        let dispatcher = Dispatcher::new(store, AddressMode::Wrap, AppDecodeLevel::Nothing);
        let mut task = DispatchTask::new(dispatcher, rx, signal.listener());
        let handle = tokio::spawn(async move { task.run().await });
        (
            RequestSender::new(tx, Duration::from_secs(1)),
            signal,
            handle,
        )
    }

    #[tokio::test]
    async fn answers_requests_in_order() {
        let store = RegisterStore::new();
        let (sender, _signal, _handle) = spawn(store.clone());

        let write: Frame = TcpFrame::new(1, UnitId::new(1), 0x06, vec![0, 3, 0, 9]).into();
        let read: Frame =
            TcpFrame::new(2, UnitId::new(1), 0x03, register_count_payload(3, 1)).into();

        let response = sender.exchange(write.clone(), &source()).await.unwrap();
        assert_eq!(response, Some(write));
        let response = sender.exchange(read, &source()).await.unwrap().unwrap();
        assert_eq!(response.data(), &[2, 0, 9]);
        assert_eq!(store.holding_registers.get(3), 9);
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let (sender, signal, handle) = spawn(RegisterStore::new());
        signal.trigger();
        assert_eq!(handle.await.unwrap(), Shutdown);

        let request: Frame = TcpFrame::new(1, UnitId::new(1), 0x03, vec![0, 0, 0, 1]).into();
        assert_eq!(sender.exchange(request, &source()).await, Err(Shutdown));
    }
}
