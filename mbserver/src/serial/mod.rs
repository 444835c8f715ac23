pub(crate) mod frame;
pub(crate) mod reassembler;
#[cfg(feature = "serial")]
pub(crate) mod server;

use std::time::Duration;

/// Serial port settings, passed through to the device driver when the port is opened
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate of the port
    pub baud_rate: u32,
    /// Number of data bits
    pub data_bits: DataBits,
    /// Types of flow control
    pub flow_control: FlowControl,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// Parity setting
    pub parity: Parity,
}

/// Number of bits per character
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataBits {
    /// 5 bits per character
    Five,
    /// 6 bits per character
    Six,
    /// 7 bits per character
    Seven,
    /// 8 bits per character
    Eight,
}

/// Flow control modes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowControl {
    /// No flow control
    None,
    /// Flow control using XON/XOFF bytes
    Software,
    /// Flow control using RTS/CTS signals
    Hardware,
}

/// Number of stop bits
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit
    One,
    /// Two stop bits
    Two,
}

/// Parity checking modes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit
    None,
    /// Parity bit sets odd number of 1 bits
    Odd,
    /// Parity bit sets even number of 1 bits
    Even,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl SerialSettings {
    /// Silent interval that separates two frames at this baud rate
    pub fn frame_gap(&self) -> Duration {
        crate::common::phys::frame_gap(self.baud_rate)
    }
}

#[cfg(feature = "serial")]
impl From<DataBits> for tokio_serial::DataBits {
    fn from(value: DataBits) -> Self {
        match value {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

#[cfg(feature = "serial")]
impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(value: FlowControl) -> Self {
        match value {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

#[cfg(feature = "serial")]
impl From<StopBits> for tokio_serial::StopBits {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

#[cfg(feature = "serial")]
impl From<Parity> for tokio_serial::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

#[cfg(feature = "serial")]
pub(crate) fn open(
    path: &str,
    settings: SerialSettings,
) -> tokio_serial::Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    tokio_serial::new(path, settings.baud_rate)
        .data_bits(settings.data_bits.into())
        .flow_control(settings.flow_control.into())
        .stop_bits(settings.stop_bits.into())
        .parity(settings.parity.into())
        .open_native_async()
}
