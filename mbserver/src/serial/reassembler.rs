use crate::common::function::FunctionCode;
use crate::error::FrameParseError;
use crate::serial::frame::{constants, RtuFrame};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LengthMode {
    /// The length is always the same (without unit id, function code and crc)
    Fixed(usize),
    /// You need to read X more bytes. The last byte contains the number of extra bytes to read after that
    Offset(usize),
    /// Unknown function code, can't determine the size
    Unknown,
}

fn length_mode(function_code: u8) -> LengthMode {
    match FunctionCode::get(function_code) {
        Some(FunctionCode::ReadCoils) => LengthMode::Fixed(4),
        Some(FunctionCode::ReadDiscreteInputs) => LengthMode::Fixed(4),
        Some(FunctionCode::ReadHoldingRegisters) => LengthMode::Fixed(4),
        Some(FunctionCode::ReadInputRegisters) => LengthMode::Fixed(4),
        Some(FunctionCode::WriteSingleCoil) => LengthMode::Fixed(4),
        Some(FunctionCode::WriteSingleRegister) => LengthMode::Fixed(4),
        Some(FunctionCode::WriteMultipleCoils) => LengthMode::Offset(5),
        Some(FunctionCode::WriteMultipleRegisters) => LengthMode::Offset(5),
        None => LengthMode::Unknown,
    }
}

/// Outcome of decoding the candidate frame at the front of a buffer
enum Candidate {
    /// a complete frame of this many bytes
    Frame(RtuFrame, usize),
    /// the leading byte cannot start a valid frame
    Invalid(Discard),
    /// the function code declares a length and fewer bytes are buffered
    Incomplete,
    /// unsupported function code and the buffer doesn't decode as one frame
    Undetermined,
}

/// Why the leading byte was discarded
#[derive(Debug)]
enum Discard {
    BadFrame(FrameParseError),
    TooLong(usize),
    FrameFollows,
    BufferFull,
}

impl std::fmt::Display for Discard {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Discard::BadFrame(err) => write!(f, "{err}"),
            Discard::TooLong(length) => write!(
                f,
                "frame length of {length} exceeds the maximum of {}",
                constants::MAX_FRAME_LENGTH
            ),
            Discard::FrameFollows => {
                f.write_str("a complete frame follows an unsupported function code")
            }
            Discard::BufferFull => f.write_str("no frame found in a full buffer"),
        }
    }
}

/// Turns the unstructured byte stream of one serial port into RTU request frames
///
/// Each port owns its own reassembler. Bytes are appended with [`Reassembler::push`]
/// and complete frames are taken out with [`Reassembler::next_frame`].
///
/// The expected frame length is derived from the function code of supported
/// requests. When a candidate frame fails its checksum, or declares a length
/// that can't fit in an RTU frame, only the leading byte is discarded and
/// decoding is retried from the next byte, so noise on the line never costs a
/// valid frame that follows it. Frames with an unsupported function code are
/// decoded from the whole buffer.
///
/// A candidate whose length is declared by its function code is always awaited
/// in full, since bytes inside its data may look like another frame. Only when
/// the function code is unsupported does a complete valid frame starting later
/// in the buffer, or a buffer at the maximum frame size, cause the leading byte
/// to be discarded. A partial frame that never completes is discarded by the
/// caller after an inter-frame silence.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Vec<u8>,
}

impl Reassembler {
    /// Create an empty reassembler
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(constants::MAX_FRAME_LENGTH),
        }
    }

    /// Number of bytes waiting to be assembled into a frame
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// true if no bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard everything buffered, e.g. after an inter-frame silence
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Append newly read bytes. Empty reads are a no-op.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Append newly read bytes and return every frame that is now complete
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<RtuFrame> {
        self.push(bytes);
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Take the next complete frame out of the buffer, if there is one
    pub fn next_frame(&mut self) -> Option<RtuFrame> {
        loop {
            let discard = match candidate(&self.buffer) {
                Candidate::Frame(frame, length) => {
                    self.buffer.drain(..length);
                    return Some(frame);
                }
                Candidate::Invalid(reason) => reason,
                Candidate::Incomplete => return None,
                Candidate::Undetermined => {
                    if self.buffer.len() >= constants::MAX_FRAME_LENGTH {
                        Discard::BufferFull
                    } else if frame_follows(&self.buffer) {
                        Discard::FrameFollows
                    } else {
                        return None;
                    }
                }
            };

            match discard {
                Discard::BadFrame(_) => {
                    tracing::warn!("{}, discarding leading byte", discard)
                }
                _ => tracing::debug!("{}, discarding leading byte", discard),
            }
            self.buffer.remove(0);
        }
    }
}

fn candidate(buffer: &[u8]) -> Candidate {
    if buffer.len() < constants::MIN_FRAME_LENGTH {
        return Candidate::Incomplete;
    }

    let function = match buffer.get(1) {
        Some(x) => *x,
        None => return Candidate::Incomplete,
    };

    let length = match length_mode(function) {
        LengthMode::Fixed(length) => frame_length(length),
        LengthMode::Offset(offset) => {
            let count = match buffer.get(
                constants::HEADER_LENGTH + constants::FUNCTION_CODE_LENGTH + offset - 1,
            ) {
                Some(x) => *x as usize,
                None => return Candidate::Incomplete,
            };
            frame_length(offset + count)
        }
        LengthMode::Unknown => {
            return match RtuFrame::decode(buffer) {
                Ok(frame) => Candidate::Frame(frame, buffer.len()),
                Err(_) => Candidate::Undetermined,
            }
        }
    };

    if length > constants::MAX_FRAME_LENGTH {
        return Candidate::Invalid(Discard::TooLong(length));
    }

    let bytes = match buffer.get(..length) {
        Some(x) => x,
        None => return Candidate::Incomplete,
    };

    match RtuFrame::decode(bytes) {
        Ok(frame) => Candidate::Frame(frame, length),
        Err(err) => Candidate::Invalid(Discard::BadFrame(err)),
    }
}

/// true if a complete, valid frame starts somewhere after the leading byte
fn frame_follows(buffer: &[u8]) -> bool {
    (1..buffer.len()).any(|start| {
        buffer
            .get(start..)
            .map(|rest| matches!(candidate(rest), Candidate::Frame(..)))
            .unwrap_or(false)
    })
}

/// unit id + function code + body + crc
fn frame_length(body: usize) -> usize {
    constants::HEADER_LENGTH + constants::FUNCTION_CODE_LENGTH + body + crate::crc::CRC_LENGTH
}
