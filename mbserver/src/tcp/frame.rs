use crate::common::buffer::ReadBuffer;
use crate::common::frame::check_data_length;
use crate::common::phys::PhysLayer;
use crate::decode::PhysDecodeLevel;
use crate::error::{FrameParseError, InternalError, MalformedFrame, RequestError};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 7;
    /// header + function code
    pub(crate) const MIN_FRAME_LENGTH: usize = HEADER_LENGTH + 1;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::common::frame::constants::MAX_ADU_LENGTH;
    /// unit id + function code
    pub(crate) const MIN_LENGTH_FIELD: usize = 2;
    // includes the 1 byte unit id
    pub(crate) const MAX_LENGTH_FIELD: usize =
        crate::common::frame::constants::MAX_ADU_LENGTH + 1;
    /// bytes of the MBAP header that precede the span counted by the length field
    pub(crate) const LENGTH_FIELD_OFFSET: usize = 6;
}

/// Modbus TCP frame: MBAP header followed by the function code and data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpFrame {
    tx_id: u16,
    protocol_id: u16,
    unit_id: UnitId,
    function: u8,
    data: Vec<u8>,
}

impl TcpFrame {
    /// Create a frame with a protocol identifier of zero
    pub fn new(tx_id: u16, unit_id: UnitId, function: u8, data: Vec<u8>) -> Self {
        Self {
            tx_id,
            protocol_id: 0,
            unit_id,
            function,
            data,
        }
    }

    /// Change the protocol identifier carried in the header
    pub fn with_protocol_id(mut self, protocol_id: u16) -> Self {
        self.protocol_id = protocol_id;
        self
    }

    /// Transaction identifier
    pub fn tx_id(&self) -> u16 {
        self.tx_id
    }

    /// Protocol identifier (carried and echoed, never interpreted)
    pub fn protocol_id(&self) -> u16 {
        self.protocol_id
    }

    /// Unit identifier
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    /// Function code
    pub fn function_code(&self) -> u8 {
        self.function
    }

    /// Data following the function code
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Replace the data following the function code
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub(crate) fn reply(&self, function: u8, data: Vec<u8>) -> Self {
        Self {
            tx_id: self.tx_id,
            protocol_id: self.protocol_id,
            unit_id: self.unit_id,
            function,
            data,
        }
    }

    /// Decode a complete MBAP frame
    ///
    /// The input must hold at least the header and a function code, and the
    /// length field must match the number of bytes that follow it exactly.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameParseError> {
        let too_short = MalformedFrame::TooShort(bytes.len(), constants::MIN_FRAME_LENGTH);

        let (header, rest) = match bytes.get(..constants::HEADER_LENGTH) {
            Some(header) => (header, &bytes[constants::HEADER_LENGTH..]),
            None => return Err(too_short.into()),
        };

        let (function, data) = match rest.split_first() {
            Some((function, data)) => (*function, data),
            None => return Err(too_short.into()),
        };

        let [tx_hi, tx_lo, proto_hi, proto_lo, len_hi, len_lo, unit_id] = match header {
            [a, b, c, d, e, f, g] => [*a, *b, *c, *d, *e, *f, *g],
            _ => return Err(too_short.into()),
        };

        let length = u16::from_be_bytes([len_hi, len_lo]) as usize;
        check_length_field(length)?;

        let remaining = bytes.len() - constants::LENGTH_FIELD_OFFSET;
        if length != remaining {
            return Err(MalformedFrame::LengthMismatch(length, remaining).into());
        }

        Ok(Self {
            tx_id: u16::from_be_bytes([tx_hi, tx_lo]),
            protocol_id: u16::from_be_bytes([proto_hi, proto_lo]),
            unit_id: UnitId::new(unit_id),
            function,
            data: data.to_vec(),
        })
    }

    /// Serialize the frame, computing the length field from the data
    pub fn encode(&self) -> Result<Vec<u8>, InternalError> {
        check_data_length(self.data.len())?;
        // unit id + function code + data, always fits in a u16 after the check above
        let length = (self.data.len() + 2) as u16;

        let mut bytes = Vec::with_capacity(constants::MIN_FRAME_LENGTH + self.data.len());
        bytes.extend_from_slice(&self.tx_id.to_be_bytes());
        bytes.extend_from_slice(&self.protocol_id.to_be_bytes());
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.push(self.unit_id.value);
        bytes.push(self.function);
        bytes.extend_from_slice(&self.data);
        Ok(bytes)
    }
}

fn check_length_field(length: usize) -> Result<(), MalformedFrame> {
    if length < constants::MIN_LENGTH_FIELD {
        return Err(MalformedFrame::LengthFieldTooSmall(length));
    }

    if length > constants::MAX_LENGTH_FIELD {
        return Err(MalformedFrame::LengthTooBig(
            length,
            constants::MAX_LENGTH_FIELD,
        ));
    }

    Ok(())
}

/// Reassembles MBAP frames from a TCP byte stream
///
/// Reads the 7-byte header, then exactly `length - 1` more bytes, and decodes
/// the whole span. A header with an invalid length field is an error and the
/// caller is expected to close the connection.
pub(crate) struct MbapReader {
    buffer: ReadBuffer,
}

impl MbapReader {
    pub(crate) fn new() -> Self {
        Self {
            buffer: ReadBuffer::new(constants::MAX_FRAME_LENGTH),
        }
    }

    pub(crate) async fn next_frame(
        &mut self,
        io: &mut PhysLayer,
        level: PhysDecodeLevel,
    ) -> Result<TcpFrame, RequestError> {
        loop {
            if let Some(frame) = self.parse()? {
                return Ok(frame);
            }
            self.buffer.read_some(io, level).await?;
        }
    }

    fn parse(&mut self) -> Result<Option<TcpFrame>, RequestError> {
        if self.buffer.len() < constants::HEADER_LENGTH {
            return Ok(None);
        }

        let length =
            u16::from_be_bytes([self.buffer.peek_at(4)?, self.buffer.peek_at(5)?]) as usize;
        check_length_field(length)?;

        let total = constants::LENGTH_FIELD_OFFSET + length;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let frame = TcpFrame::decode(self.buffer.read(total)?)?;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    //                            |   tx id  |  proto id |  length  | unit | fc | data |
    const SIMPLE_FRAME: &[u8] = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x2A, 0x03, 0x04];

    fn assert_equals_simple_frame(frame: &TcpFrame) {
        assert_eq!(frame.tx_id(), 0x0007);
        assert_eq!(frame.protocol_id(), 0);
        assert_eq!(frame.unit_id(), UnitId::new(0x2A));
        assert_eq!(frame.function_code(), 0x03);
        assert_eq!(frame.data(), &[0x04]);
    }

    async fn read_frame(chunks: &[&[u8]]) -> Result<TcpFrame, RequestError> {
        let mut builder = Builder::new();
        for chunk in chunks {
            builder.read(chunk);
        }
        let mut phys = PhysLayer::new_mock(builder.build());
        let mut reader = MbapReader::new();
        reader.next_frame(&mut phys, PhysDecodeLevel::Nothing).await
    }

    #[test]
    fn correctly_formats_frame() {
        let frame = TcpFrame::new(7, UnitId::new(0x2A), 0x03, vec![0x04]);
        assert_eq!(frame.encode().unwrap(), SIMPLE_FRAME);
    }

    #[test]
    fn decodes_simple_frame() {
        assert_equals_simple_frame(&TcpFrame::decode(SIMPLE_FRAME).unwrap());
    }

    #[test]
    fn decodes_frame_without_data() {
        let frame = TcpFrame::decode(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01, 0xFF]).unwrap();
        assert_eq!(frame.function_code(), 0xFF);
        assert!(frame.data().is_empty());
    }

    #[test]
    fn carries_nonzero_protocol_id() {
        let bytes = &[0x00, 0x07, 0xCA, 0xFE, 0x00, 0x03, 0x2A, 0x03, 0x04];
        let frame = TcpFrame::decode(bytes).unwrap();
        assert_eq!(frame.protocol_id(), 0xCAFE);
        assert_eq!(frame.encode().unwrap(), bytes);
        assert_eq!(
            TcpFrame::new(7, UnitId::new(0x2A), 0x03, vec![0x04]).with_protocol_id(0xCAFE),
            frame
        );
    }

    #[test]
    fn decode_rejects_short_input() {
        assert_eq!(
            TcpFrame::decode(&SIMPLE_FRAME[..7]),
            Err(MalformedFrame::TooShort(7, 8).into())
        );
        assert_eq!(
            TcpFrame::decode(&[]),
            Err(MalformedFrame::TooShort(0, 8).into())
        );
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        // declares 4 bytes after the length field, but only 3 follow
        let bytes = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x04, 0x2A, 0x03, 0x04];
        assert_eq!(
            TcpFrame::decode(bytes),
            Err(MalformedFrame::LengthMismatch(4, 3).into())
        );
        // trailing garbage is a mismatch as well
        let bytes = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x2A, 0x03, 0x04, 0x05];
        assert_eq!(
            TcpFrame::decode(bytes),
            Err(MalformedFrame::LengthMismatch(3, 4).into())
        );
    }

    #[test]
    fn decode_rejects_length_field_too_small() {
        let bytes = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x01, 0x2A, 0x03];
        assert_eq!(
            TcpFrame::decode(bytes),
            Err(MalformedFrame::LengthFieldTooSmall(1).into())
        );
    }

    #[test]
    fn encode_then_decode_preserves_fields() {
        let frame =
            TcpFrame::new(0xBEEF, UnitId::new(0x11), 0x10, vec![0, 7, 0, 2, 4, 0, 3, 0, 4]);
        let decoded = TcpFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn can_parse_frame_from_stream() {
        assert_equals_simple_frame(&read_frame(&[SIMPLE_FRAME]).await.unwrap());
    }

    #[tokio::test]
    async fn can_parse_frame_if_segmented_in_header() {
        let (f1, f2) = SIMPLE_FRAME.split_at(4);
        assert_equals_simple_frame(&read_frame(&[f1, f2]).await.unwrap());
    }

    #[tokio::test]
    async fn can_parse_frame_if_segmented_in_payload() {
        let (f1, f2) = SIMPLE_FRAME.split_at(8);
        assert_equals_simple_frame(&read_frame(&[f1, f2]).await.unwrap());
    }

    #[tokio::test]
    async fn can_parse_two_frames_from_one_read() {
        let mut both = SIMPLE_FRAME.to_vec();
        both.extend_from_slice(SIMPLE_FRAME);
        let mut phys = PhysLayer::new_mock(Builder::new().read(&both).build());
        let mut reader = MbapReader::new();
        for _ in 0..2 {
            let frame = reader
                .next_frame(&mut phys, PhysDecodeLevel::Nothing)
                .await
                .unwrap();
            assert_equals_simple_frame(&frame);
        }
    }

    #[tokio::test]
    async fn can_parse_maximum_size_frame() {
        // maximum ADU length is 253, so max MBAP length value is 254 which is 0xFE
        let header = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFE, 0x2A];
        let payload = &[0xCC; 253];

        let frame = read_frame(&[header, payload]).await.unwrap();
        assert_eq!(frame.function_code(), 0xCC);
        assert_eq!(frame.data(), &payload[1..]);
    }

    #[tokio::test]
    async fn errors_when_mbap_length_too_big() {
        let header = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFF, 0x2A];
        assert_eq!(
            read_frame(&[header]).await,
            Err(RequestError::BadFrame(
                MalformedFrame::LengthTooBig(0xFF, constants::MAX_LENGTH_FIELD).into()
            ))
        );
    }

    #[tokio::test]
    async fn errors_on_length_of_zero() {
        let header = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x2A];
        assert_eq!(
            read_frame(&[header]).await,
            Err(RequestError::BadFrame(
                MalformedFrame::LengthFieldTooSmall(0).into()
            ))
        );
    }

    #[tokio::test]
    async fn errors_when_stream_ends_mid_frame() {
        assert_eq!(
            read_frame(&[&SIMPLE_FRAME[..5]]).await,
            Err(RequestError::Io(std::io::ErrorKind::UnexpectedEof))
        );
    }
}
