/// How much of the traffic handled by the server is decoded into the log
///
/// Each layer is controlled independently. Everything is logged at the INFO level.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeLevel {
    /// Decoding of request and response PDUs
    pub app: AppDecodeLevel,
    /// Decoding of the MBAP header (TCP) or the unit id and CRC (RTU)
    pub frame: FrameDecodeLevel,
    /// Logging of raw reads and writes on sockets and serial ports
    pub physical: PhysDecodeLevel,
}

/// Decoding of PDUs, each level including everything below it
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum AppDecodeLevel {
    /// Decode nothing
    #[default]
    Nothing,
    /// Decode the function code only
    FunctionCode,
    /// Also decode the address range or the written address
    DataHeaders,
    /// Also decode every value read or written
    DataValues,
}

/// Decoding of transport framing
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameDecodeLevel {
    /// Decode nothing
    #[default]
    Nothing,
    /// Decode the header fields
    Header,
    /// Decode the header fields and dump the data as hexadecimal
    Payload,
}

/// Logging of physical layer I/O
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PhysDecodeLevel {
    /// Log nothing
    #[default]
    Nothing,
    /// Log the number of bytes of every read and write
    Length,
    /// Log the number of bytes and the bytes themselves
    Data,
}

impl DecodeLevel {
    /// A `DecodeLevel` with every layer turned off
    pub fn nothing() -> Self {
        Self::default()
    }

    /// A `DecodeLevel` with the given level for each layer
    pub fn new(app: AppDecodeLevel, frame: FrameDecodeLevel, physical: PhysDecodeLevel) -> Self {
        Self {
            app,
            frame,
            physical,
        }
    }
}

impl AppDecodeLevel {
    pub(crate) fn enabled(self) -> bool {
        self >= AppDecodeLevel::FunctionCode
    }

    pub(crate) fn data_headers(self) -> bool {
        self >= AppDecodeLevel::DataHeaders
    }

    pub(crate) fn data_values(self) -> bool {
        self >= AppDecodeLevel::DataValues
    }
}

impl FrameDecodeLevel {
    pub(crate) fn enabled(self) -> bool {
        self >= FrameDecodeLevel::Header
    }

    pub(crate) fn payload_enabled(self) -> bool {
        self >= FrameDecodeLevel::Payload
    }
}

impl PhysDecodeLevel {
    pub(crate) fn enabled(self) -> bool {
        self >= PhysDecodeLevel::Length
    }

    pub(crate) fn data_enabled(self) -> bool {
        self >= PhysDecodeLevel::Data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_include_the_ones_below() {
        assert!(!AppDecodeLevel::Nothing.enabled());
        assert!(AppDecodeLevel::FunctionCode.enabled());
        assert!(!AppDecodeLevel::FunctionCode.data_headers());
        assert!(AppDecodeLevel::DataValues.data_headers());
        assert!(FrameDecodeLevel::Payload.enabled());
        assert!(!FrameDecodeLevel::Header.payload_enabled());
        assert!(PhysDecodeLevel::Data.enabled());
        assert!(!PhysDecodeLevel::Length.data_enabled());
    }

    #[test]
    fn nothing_is_the_default() {
        let level = DecodeLevel::nothing();
        assert!(!level.app.enabled());
        assert!(!level.frame.enabled());
        assert!(!level.physical.enabled());
    }
}
