use std::time::Duration;

use crate::common::frame::{Frame, FrameDisplay};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::{RequestError, Shutdown};
use crate::retry::RetryStrategy;
use crate::serial::frame::{constants, RtuFrame};
use crate::serial::reassembler::Reassembler;
use crate::serial::SerialSettings;
use crate::server::request::{RequestSender, Source};
use crate::shutdown::ShutdownListener;

/// Owns a serial port, reopening it after failures until the server shuts down
pub(crate) struct RtuServerTask {
    pub(crate) port: String,
    pub(crate) retry: Box<dyn RetryStrategy>,
    pub(crate) settings: SerialSettings,
    pub(crate) session: RtuSession,
}

impl RtuServerTask {
    /// Serve the already opened `serial` port, then keep reopening it after every failure
    pub(crate) async fn run(&mut self, serial: tokio_serial::SerialStream) -> Shutdown {
        let mut serial = Some(serial);
        loop {
            let stream = match serial.take() {
                Some(x) => x,
                None => match crate::serial::open(&self.port, self.settings) {
                    Ok(x) => {
                        self.retry.reset();
                        tracing::info!("reopened port");
                        x
                    }
                    Err(err) => {
                        let delay = self.retry.after_failed_open();
                        tracing::warn!(
                            "unable to open serial port, retrying in {:?} - error: {}",
                            delay,
                            err
                        );
                        if let Err(Shutdown) = self.session.sleep_for(delay).await {
                            return Shutdown;
                        }
                        continue;
                    }
                },
            };

            // run an open port until shutdown or failure
            let mut phys = PhysLayer::new_serial(stream);
            let err = self.session.run(&mut phys).await;
            if let RequestError::Shutdown = err {
                return Shutdown;
            }
            drop(phys);

            // wait here so a port that opens and immediately fails doesn't spin
            let delay = self.retry.after_disconnect();
            tracing::warn!("serial port failed ({}), waiting {:?} to reopen", err, delay);
            if let Err(Shutdown) = self.session.sleep_for(delay).await {
                return Shutdown;
            }
        }
    }
}

/// Reads RTU requests from one open port and writes back their responses
pub(crate) struct RtuSession {
    reassembler: Reassembler,
    buffer: [u8; constants::MAX_FRAME_LENGTH],
    source: Source,
    sender: RequestSender,
    shutdown: ShutdownListener,
    frame_gap: Duration,
    decode: DecodeLevel,
}

impl RtuSession {
    pub(crate) fn new(
        port: &str,
        frame_gap: Duration,
        sender: RequestSender,
        shutdown: ShutdownListener,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            reassembler: Reassembler::new(),
            buffer: [0; constants::MAX_FRAME_LENGTH],
            source: Source::Serial(port.to_string()),
            sender,
            shutdown,
            frame_gap,
            decode,
        }
    }

    /// Runs until the port fails or the server shuts down
    pub(crate) async fn run(&mut self, phys: &mut PhysLayer) -> RequestError {
        // bytes from a previous port are meaningless
        self.reassembler.clear();
        loop {
            if let Err(err) = self.run_one(phys).await {
                return err;
            }
        }
    }

    pub(crate) async fn sleep_for(&mut self, delay: Duration) -> Result<(), Shutdown> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.shutdown.wait() => Err(Shutdown),
        }
    }

    async fn run_one(&mut self, phys: &mut PhysLayer) -> Result<(), RequestError> {
        let count = if self.reassembler.is_empty() {
            tokio::select! {
                count = phys.read(&mut self.buffer, self.decode.physical) => count?,
                _ = self.shutdown.wait() => return Err(RequestError::Shutdown),
            }
        } else {
            // a partial frame is buffered, so silence on the line ends it
            let read = tokio::time::timeout(
                self.frame_gap,
                phys.read(&mut self.buffer, self.decode.physical),
            );
            tokio::select! {
                result = read => match result {
                    Ok(count) => count?,
                    Err(_) => {
                        tracing::debug!(
                            "discarding {} byte(s) after inter-frame silence",
                            self.reassembler.len()
                        );
                        self.reassembler.clear();
                        return Ok(());
                    }
                },
                _ = self.shutdown.wait() => return Err(RequestError::Shutdown),
            }
        };

        if count == 0 {
            tracing::debug!("serial port returned no data");
            return Ok(());
        }

        let frames = match self.buffer.get(..count) {
            Some(bytes) => self.reassembler.feed(bytes),
            None => Vec::new(),
        };

        for frame in frames {
            self.reply(phys, frame).await?;
        }

        Ok(())
    }

    async fn reply(&mut self, phys: &mut PhysLayer, frame: RtuFrame) -> Result<(), RequestError> {
        let frame = Frame::Rtu(frame);

        if self.decode.frame.enabled() {
            tracing::info!("RTU RX - {}", FrameDisplay::new(self.decode.frame, &frame));
        }

        let response = match self.sender.exchange(frame, &self.source).await? {
            Some(response) => response,
            None => return Ok(()),
        };

        if self.decode.frame.enabled() {
            tracing::info!("RTU TX - {}", FrameDisplay::new(self.decode.frame, &response));
        }

        let bytes = response.encode()?;
        phys.write(&bytes, self.decode.physical).await?;
        Ok(())
    }
}
