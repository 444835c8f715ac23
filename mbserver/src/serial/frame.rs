use crate::common::frame::check_data_length;
use crate::crc::CRC_LENGTH;
use crate::error::{FrameParseError, InternalError, MalformedFrame};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 1;
    pub(crate) const FUNCTION_CODE_LENGTH: usize = 1;
    /// unit id + function code + at least one data byte + crc
    pub(crate) const MIN_FRAME_LENGTH: usize =
        HEADER_LENGTH + FUNCTION_CODE_LENGTH + 1 + crate::crc::CRC_LENGTH;
    /// unit id + 253 byte PDU + crc
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::common::frame::constants::MAX_ADU_LENGTH + crate::crc::CRC_LENGTH;
}

/// Modbus RTU frame: unit id, function code, data and a trailing CRC
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RtuFrame {
    unit_id: UnitId,
    function: u8,
    data: Vec<u8>,
    crc: u16,
}

impl RtuFrame {
    /// Create a frame, computing its checksum
    pub fn new(unit_id: UnitId, function: u8, data: Vec<u8>) -> Self {
        let crc = checksum(unit_id, function, &data);
        Self {
            unit_id,
            function,
            data,
            crc,
        }
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

    /// Checksum of the frame as received, or as computed for a locally built frame
    pub fn crc(&self) -> u16 {
        self.crc
    }

    /// Replace the data following the function code, updating the checksum
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.crc = checksum(self.unit_id, self.function, &data);
        self.data = data;
    }

    pub(crate) fn reply(&self, function: u8, data: Vec<u8>) -> Self {
        Self::new(self.unit_id, function, data)
    }

    /// Decode a complete RTU frame, validating its trailing little-endian checksum
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameParseError> {
        if bytes.len() < constants::MIN_FRAME_LENGTH {
            return Err(
                MalformedFrame::TooShort(bytes.len(), constants::MIN_FRAME_LENGTH).into(),
            );
        }

        if bytes.len() > constants::MAX_FRAME_LENGTH {
            return Err(
                MalformedFrame::LengthTooBig(bytes.len(), constants::MAX_FRAME_LENGTH).into(),
            );
        }

        let (body, crc) = bytes.split_at(bytes.len() - CRC_LENGTH);
        let (unit_id, function, data) = match body {
            [unit_id, function, data @ ..] => (*unit_id, *function, data),
            _ => {
                return Err(
                    MalformedFrame::TooShort(bytes.len(), constants::MIN_FRAME_LENGTH).into(),
                )
            }
        };

        let received = match crc {
            [low, high] => u16::from_le_bytes([*low, *high]),
            _ => {
                return Err(
                    MalformedFrame::TooShort(bytes.len(), constants::MIN_FRAME_LENGTH).into(),
                )
            }
        };

        let expected = crate::crc::compute(body);
        if received != expected {
            return Err(FrameParseError::ChecksumMismatch { received, expected });
        }

        Ok(Self {
            unit_id: UnitId::new(unit_id),
            function,
            data: data.to_vec(),
            crc: received,
        })
    }

    /// Serialize the frame, appending a freshly computed checksum
    pub fn encode(&self) -> Result<Vec<u8>, InternalError> {
        check_data_length(self.data.len())?;

        let mut bytes = Vec::with_capacity(constants::MIN_FRAME_LENGTH + self.data.len());
        bytes.push(self.unit_id.value);
        bytes.push(self.function);
        bytes.extend_from_slice(&self.data);
        let crc = crate::crc::compute(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }
}

fn checksum(unit_id: UnitId, function: u8, data: &[u8]) -> u16 {
    crate::crc::compute_parts(&[&[unit_id.value, function], data])
}

#[cfg(test)]
pub(crate) mod test_frames {
    pub(crate) const UNIT_ID: u8 = 0x2A;

    pub(crate) const READ_COILS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x01,    // function code
        0x00, 0x10, // starting address
        0x00, 0x13, // qty of outputs
        0x7A, 0x19, // crc
    ];

    pub(crate) const READ_DISCRETE_INPUTS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x02,    // function code
        0x00, 0x10, // starting address
        0x00, 0x13, // qty of outputs
        0x3E, 0x19, // crc
    ];

    pub(crate) const READ_HOLDING_REGISTERS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x03,    // function code
        0x00, 0x10, // starting address
        0x00, 0x03, // qty of registers
        0x02, 0x15, // crc
    ];

    pub(crate) const READ_HOLDING_REGISTERS_RESPONSE: &[u8] = &[
        UNIT_ID, // unit id
        0x03,    // function code
        0x06,    // byte count
        0x12, 0x34, 0x56, 0x78, 0x23, 0x45, // register values
        0x30, 0x60, // crc
    ];

    pub(crate) const READ_INPUT_REGISTERS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x04,    // function code
        0x00, 0x10, // starting address
        0x00, 0x03, // qty of registers
        0xB7, 0xD5, // crc
    ];

    pub(crate) const WRITE_SINGLE_COIL_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x05,    // function code
        0x00, 0x10, // output address
        0xFF, 0x00, // output value
        0x8B, 0xE4, // crc
    ];

    pub(crate) const WRITE_SINGLE_REGISTER_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x06,    // function code
        0x00, 0x10, // output address
        0x12, 0x34, // output value
        0x83, 0x63, // crc
    ];

    pub(crate) const WRITE_MULTIPLE_COILS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x0F,    // function code
        0x00, 0x10, // starting address
        0x00, 0x0A, // qty of outputs
        0x02, // byte count
        0x12, 0x34, // output values
        0x00, 0x2E, // crc
    ];

    pub(crate) const WRITE_MULTIPLE_COILS_RESPONSE: &[u8] = &[
        UNIT_ID, // unit id
        0x0F,    // function code
        0x00, 0x10, // starting address
        0x00, 0x0A, // qty of outputs
        0xD2, 0x12, // crc
    ];

    pub(crate) const WRITE_MULTIPLE_REGISTERS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x10,    // function code
        0x00, 0x10, // starting address
        0x00, 0x02, // qty of outputs
        0x04, // byte count
        0x12, 0x34, 0x56, 0x78, // output values
        0x07, 0x73, // crc
    ];

    pub(crate) const ALL_REQUESTS: &[(u8, &[u8])] = &[
        (0x01, READ_COILS_REQUEST),
        (0x02, READ_DISCRETE_INPUTS_REQUEST),
        (0x03, READ_HOLDING_REGISTERS_REQUEST),
        (0x04, READ_INPUT_REGISTERS_REQUEST),
        (0x05, WRITE_SINGLE_COIL_REQUEST),
        (0x06, WRITE_SINGLE_REGISTER_REQUEST),
        (0x0F, WRITE_MULTIPLE_COILS_REQUEST),
        (0x10, WRITE_MULTIPLE_REGISTERS_REQUEST),
    ];
}
