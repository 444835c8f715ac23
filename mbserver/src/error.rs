/// Marker type returned by task loops when the server's shutdown signal fires
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Shutdown;

impl std::fmt::Display for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("the server has been shut down")
    }
}

impl std::error::Error for Shutdown {}

/// Top-level error type used by the transport adapters
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// An I/O error occurred on the underlying transport
    Io(std::io::ErrorKind),
    /// A frame could not be decoded
    BadFrame(FrameParseError),
    /// An internal error occurred while serializing a frame
    Internal(InternalError),
    /// The server was shut down while the operation was in progress
    Shutdown,
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RequestError::Io(kind) => write!(f, "i/o error: {kind}"),
            RequestError::BadFrame(err) => write!(f, "bad frame: {err}"),
            RequestError::Internal(err) => write!(f, "internal error: {err}"),
            RequestError::Shutdown => f.write_str("the server has been shut down"),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<MalformedFrame> for RequestError {
    fn from(err: MalformedFrame) -> Self {
        RequestError::BadFrame(err.into())
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<Shutdown> for RequestError {
    fn from(_: Shutdown) -> Self {
        RequestError::Shutdown
    }
}

/// Errors that occur while decoding a frame (TCP or RTU)
///
/// These never surface to the far end as a Modbus exception. A malformed frame
/// means "wait for more bytes" on serial or "close the connection" on TCP, while
/// a checksum mismatch makes the serial reassembler resynchronize.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    /// Not enough bytes, or the header disagrees with the byte count
    MalformedFrame(MalformedFrame),
    /// The trailing RTU checksum does not match the one computed over the frame
    ChecksumMismatch {
        /// checksum carried by the frame
        received: u16,
        /// checksum computed over the preceding bytes
        expected: u16,
    },
}

/// Ways in which a frame can be structurally invalid
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MalformedFrame {
    /// Fewer bytes than the minimum frame size (actual, minimum)
    TooShort(usize, usize),
    /// The MBAP length field doesn't match the bytes that follow it (declared, actual)
    LengthMismatch(usize, usize),
    /// The declared or computed length exceeds the maximum frame size (length, max)
    LengthTooBig(usize, usize),
    /// The MBAP length field can't hold a unit id and a function code
    LengthFieldTooSmall(usize),
}

impl FrameParseError {
    /// true if the frame was structurally invalid
    pub fn is_malformed(&self) -> bool {
        matches!(self, FrameParseError::MalformedFrame(_))
    }

    /// true if the frame failed checksum validation
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, FrameParseError::ChecksumMismatch { .. })
    }
}

impl From<MalformedFrame> for FrameParseError {
    fn from(err: MalformedFrame) -> Self {
        FrameParseError::MalformedFrame(err)
    }
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::MalformedFrame(err) => write!(f, "malformed frame: {err}"),
            FrameParseError::ChecksumMismatch { received, expected } => write!(
                f,
                "received checksum {received:#06X} doesn't match computed checksum {expected:#06X}"
            ),
        }
    }
}

impl std::fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            MalformedFrame::TooShort(actual, min) => write!(
                f,
                "frame of {actual} bytes is shorter than the minimum of {min} bytes"
            ),
            MalformedFrame::LengthMismatch(declared, actual) => write!(
                f,
                "length field ({declared}) doesn't match the number of bytes remaining ({actual})"
            ),
            MalformedFrame::LengthTooBig(length, max) => write!(
                f,
                "frame length ({length}) exceeds the maximum allowed length ({max})"
            ),
            MalformedFrame::LengthFieldTooSmall(length) => write!(
                f,
                "length field ({length}) is too small to hold a unit id and function code"
            ),
        }
    }
}

/// Errors that indicate a bug or a misuse of the frame building API
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InternalError {
    /// The encoded frame would exceed the maximum size (size, max)
    FrameTooBig(usize, usize),
    /// A byte count would exceed the maximum value of u8
    BadByteCount(usize),
    /// Attempted to read more bytes than present (requested, remaining)
    InsufficientBytesForRead(usize, usize),
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InternalError::FrameTooBig(size, max) => write!(
                f,
                "frame length of {size} exceeds the maximum allowed length of {max}"
            ),
            InternalError::BadByteCount(count) => {
                write!(f, "byte count would exceed maximum size of u8: {count}")
            }
            InternalError::InsufficientBytesForRead(requested, remaining) => write!(
                f,
                "attempted to read {requested} bytes with only {remaining} remaining"
            ),
        }
    }
}

/// Errors that occur while parsing the body of a request PDU
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum AduParseError {
    /// request is too short to be valid
    InsufficientBytes,
    /// request contains extra trailing bytes
    TrailingBytes(usize),
    /// byte count field doesn't match the quantity (expected, actual)
    ByteCountMismatch(usize, usize),
    /// bad value for the coil state
    UnknownCoilState(u16),
}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AduParseError::InsufficientBytes => f.write_str("request is too short to be valid"),
            AduParseError::TrailingBytes(count) => {
                write!(f, "request contains {count} extra trailing bytes")
            }
            AduParseError::ByteCountMismatch(expected, actual) => write!(
                f,
                "byte count ({actual}) doesn't match what is expected based on the quantity ({expected})"
            ),
            AduParseError::UnknownCoilState(value) => write!(
                f,
                "received coil state with unspecified value: {value:#06X}"
            ),
        }
    }
}

impl From<AduParseError> for crate::exception::ExceptionCode {
    fn from(_: AduParseError) -> Self {
        // a request body that doesn't match its function code is a bad value
        crate::exception::ExceptionCode::IllegalDataValue
    }
}
