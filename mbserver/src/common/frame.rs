use crate::common::function::EXCEPTION_MASK;
use crate::decode::FrameDecodeLevel;
use crate::error::InternalError;
use crate::exception::ExceptionCode;
use crate::serial::frame::RtuFrame;
use crate::tcp::frame::TcpFrame;
use crate::types::UnitId;

pub(crate) mod constants {
    /// function code + data
    pub(crate) const MAX_ADU_LENGTH: usize = 253;
    pub(crate) const MAX_DATA_LENGTH: usize = MAX_ADU_LENGTH - 1;
}

/// A decoded Modbus message, tagged with the transport framing that carried it
///
/// Both variants expose the same capabilities: the unit id, function code and
/// data of the PDU, encoding back to wire bytes, and building a response that
/// keeps the request's header identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Modbus TCP (MBAP header)
    Tcp(TcpFrame),
    /// Modbus RTU (unit id + CRC)
    Rtu(RtuFrame),
}

impl Frame {
    /// Unit identifier of the frame
    pub fn unit_id(&self) -> UnitId {
        match self {
            Frame::Tcp(x) => x.unit_id(),
            Frame::Rtu(x) => x.unit_id(),
        }
    }

    /// Raw function code of the frame (high bit set for exception responses)
    pub fn function_code(&self) -> u8 {
        match self {
            Frame::Tcp(x) => x.function_code(),
            Frame::Rtu(x) => x.function_code(),
        }
    }

    /// Data that follows the function code
    pub fn data(&self) -> &[u8] {
        match self {
            Frame::Tcp(x) => x.data(),
            Frame::Rtu(x) => x.data(),
        }
    }

    /// Replace the data that follows the function code
    pub fn set_data(&mut self, data: Vec<u8>) {
        match self {
            Frame::Tcp(x) => x.set_data(data),
            Frame::Rtu(x) => x.set_data(data),
        }
    }

    /// Serialize the frame to its wire representation
    pub fn encode(&self) -> Result<Vec<u8>, InternalError> {
        match self {
            Frame::Tcp(x) => x.encode(),
            Frame::Rtu(x) => x.encode(),
        }
    }

    /// Build a normal response to this frame: same header identity and function code
    pub fn build_response(&self, payload: Vec<u8>) -> Frame {
        self.reply(self.function_code(), payload)
    }

    /// Build an exception response to this frame carrying a single exception code byte
    pub fn build_exception(&self, ex: ExceptionCode) -> Frame {
        self.reply(self.function_code() | EXCEPTION_MASK, vec![ex.into()])
    }

    /// If this is an exception response, the exception code it carries
    pub fn exception(&self) -> Option<ExceptionCode> {
        if self.function_code() & EXCEPTION_MASK == 0 {
            return None;
        }
        match self.data() {
            [code] => Some(ExceptionCode::from(*code)),
            _ => None,
        }
    }

    fn reply(&self, function: u8, payload: Vec<u8>) -> Frame {
        match self {
            Frame::Tcp(x) => Frame::Tcp(x.reply(function, payload)),
            Frame::Rtu(x) => Frame::Rtu(x.reply(function, payload)),
        }
    }
}

impl From<TcpFrame> for Frame {
    fn from(frame: TcpFrame) -> Self {
        Frame::Tcp(frame)
    }
}

impl From<RtuFrame> for Frame {
    fn from(frame: RtuFrame) -> Self {
        Frame::Rtu(frame)
    }
}

/// Build the `[addrHi, addrLo, countHi, countLo]` payload used by read requests
/// and write multiple responses
pub fn register_count_payload(register: u16, count: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4);
    payload.extend_from_slice(&register.to_be_bytes());
    payload.extend_from_slice(&count.to_be_bytes());
    payload
}

/// Build the `[addr, count, byteCount, values...]` payload of a write multiple registers
/// request, where `byteCount = 2 * count` and every value is big-endian
pub fn register_values_payload(
    register: u16,
    count: u16,
    values: &[u16],
) -> Result<Vec<u8>, InternalError> {
    let byte_count = crate::common::bits::byte_count_for_registers(count)?;
    let mut payload = register_count_payload(register, count);
    payload.reserve(1 + 2 * values.len());
    payload.push(byte_count);
    for value in values {
        payload.extend_from_slice(&value.to_be_bytes());
    }
    Ok(payload)
}

pub(crate) fn check_data_length(len: usize) -> Result<(), InternalError> {
    if len > constants::MAX_DATA_LENGTH {
        return Err(InternalError::FrameTooBig(
            len + 1,
            constants::MAX_ADU_LENGTH,
        ));
    }
    Ok(())
}

pub(crate) struct FrameDisplay<'a> {
    level: FrameDecodeLevel,
    frame: &'a Frame,
}

impl<'a> FrameDisplay<'a> {
    pub(crate) fn new(level: FrameDecodeLevel, frame: &'a Frame) -> Self {
        Self { level, frame }
    }
}

impl std::fmt::Display for FrameDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.frame {
            Frame::Tcp(x) => write!(
                f,
                "tx_id: {:#06X} proto: {:#06X} unit: {} fc: {:#04X} (data len = {})",
                x.tx_id(),
                x.protocol_id(),
                x.unit_id(),
                x.function_code(),
                x.data().len()
            )?,
            Frame::Rtu(x) => write!(
                f,
                "unit: {} fc: {:#04X} crc: {:#06X} (data len = {})",
                x.unit_id(),
                x.function_code(),
                x.crc(),
                x.data().len()
            )?,
        }
        if self.level.payload_enabled() {
            crate::common::phys::format_bytes(f, self.frame.data())?;
        }
        Ok(())
    }
}
