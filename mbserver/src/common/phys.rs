use std::fmt::Write;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::decode::PhysDecodeLevel;

/// The byte stream a request arrived on and its response leaves by
pub(crate) enum PhysLayer {
    Tcp(tokio::net::TcpStream),
    #[cfg(feature = "serial")]
    Serial(tokio_serial::SerialStream),
    #[cfg(test)]
    Mock(Box<dyn Stream>),
}

pub(crate) trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

impl std::fmt::Debug for PhysLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PhysLayer::Tcp(_) => f.write_str("Tcp"),
            #[cfg(feature = "serial")]
            PhysLayer::Serial(_) => f.write_str("Serial"),
            #[cfg(test)]
            PhysLayer::Mock(_) => f.write_str("Mock"),
        }
    }
}

impl PhysLayer {
    pub(crate) fn new_tcp(socket: tokio::net::TcpStream) -> Self {
        PhysLayer::Tcp(socket)
    }

    #[cfg(feature = "serial")]
    pub(crate) fn new_serial(stream: tokio_serial::SerialStream) -> Self {
        PhysLayer::Serial(stream)
    }

    #[cfg(test)]
    pub(crate) fn new_mock<T>(mock: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        PhysLayer::Mock(Box::new(mock))
    }

    fn stream(&mut self) -> &mut dyn Stream {
        match self {
            PhysLayer::Tcp(x) => x,
            #[cfg(feature = "serial")]
            PhysLayer::Serial(x) => x,
            #[cfg(test)]
            PhysLayer::Mock(x) => x.as_mut(),
        }
    }

    /// Read whatever is available. Zero means the peer closed the stream.
    pub(crate) async fn read(
        &mut self,
        buffer: &mut [u8],
        level: PhysDecodeLevel,
    ) -> Result<usize, std::io::Error> {
        let length = self.stream().read(buffer).await?;

        if level.enabled() {
            if let Some(x) = buffer.get(..length) {
                tracing::info!("PHYS RX - {}", PhysDisplay::new(level, x))
            }
        }

        Ok(length)
    }

    pub(crate) async fn write(
        &mut self,
        data: &[u8],
        level: PhysDecodeLevel,
    ) -> Result<(), std::io::Error> {
        if level.enabled() {
            tracing::info!("PHYS TX - {}", PhysDisplay::new(level, data));
        }

        let stream = self.stream();
        stream.write_all(data).await?;
        stream.flush().await
    }
}

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        PhysDisplay { level, data }
    }
}

impl std::fmt::Display for PhysDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

/// Silent interval (t3.5) that delimits RTU frames at the given baud rate
pub(crate) fn frame_gap(baud_rate: u32) -> Duration {
    // 1 start bit, 8 data bits, parity or a second stop bit, 1 stop bit
    const BITS_PER_CHAR: u64 = 11;
    // above 19200 baud the interval is fixed
    const MAX_BAUD_RATE: u32 = 19200;
    const MIN_GAP: Duration = Duration::from_micros(1750);

    if baud_rate == 0 || baud_rate > MAX_BAUD_RATE {
        return MIN_GAP;
    }

    let char_time = Duration::from_secs(BITS_PER_CHAR) / baud_rate;
    (char_time * 7 / 2).max(MIN_GAP)
}

const BYTES_PER_LINE: usize = 18;

pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for line in bytes.chunks(BYTES_PER_LINE) {
        f.write_char('\n')?;
        for (i, byte) in line.iter().enumerate() {
            if i > 0 {
                f.write_char(' ')?;
            }
            write!(f, "{byte:02X}")?;
        }
    }
    Ok(())
}
