use crate::common::bits::{byte_count_for_bits, byte_count_for_registers, num_bytes_for_bits};
use crate::common::cursor::ReadCursor;
use crate::common::frame::register_count_payload;
use crate::common::function::FunctionCode;
use crate::constants::limits;
use crate::decode::AppDecodeLevel;
use crate::error::{AduParseError, InternalError};
use crate::exception::ExceptionCode;
use crate::server::store::RegisterStore;
use crate::types::*;

/// A request PDU parsed and validated against the protocol limits
#[derive(Debug)]
pub(crate) enum Operation<'a> {
    ReadCoils(AddressRange),
    ReadDiscreteInputs(AddressRange),
    ReadHoldingRegisters(AddressRange),
    ReadInputRegisters(AddressRange),
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
    WriteMultipleCoils(AddressRange, BitIterator<'a>),
    WriteMultipleRegisters(AddressRange, RegisterIterator<'a>),
}

impl<'a> Operation<'a> {
    pub(crate) fn get_function(&self) -> FunctionCode {
        match self {
            Operation::ReadCoils(_) => FunctionCode::ReadCoils,
            Operation::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Operation::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Operation::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Operation::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Operation::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Operation::WriteMultipleCoils(_, _) => FunctionCode::WriteMultipleCoils,
            Operation::WriteMultipleRegisters(_, _) => FunctionCode::WriteMultipleRegisters,
        }
    }

    /// Parse the data that follows the function code
    ///
    /// Any structural problem with the data or a quantity outside the protocol
    /// limits is `IllegalDataValue`. A range that runs past address 65535 is
    /// `IllegalDataAddress` in [`AddressMode::Strict`] and wraps otherwise.
    pub(crate) fn parse(
        function: FunctionCode,
        data: &'a [u8],
        mode: AddressMode,
    ) -> Result<Self, ExceptionCode> {
        let mut cursor = ReadCursor::new(data);
        let cursor = &mut cursor;

        let operation = match function {
            FunctionCode::ReadCoils => Operation::ReadCoils(
                Self::parse_read(cursor)?.validate(limits::MAX_READ_COILS_COUNT, mode)?,
            ),
            FunctionCode::ReadDiscreteInputs => Operation::ReadDiscreteInputs(
                Self::parse_read(cursor)?.validate(limits::MAX_READ_COILS_COUNT, mode)?,
            ),
            FunctionCode::ReadHoldingRegisters => Operation::ReadHoldingRegisters(
                Self::parse_read(cursor)?.validate(limits::MAX_READ_REGISTERS_COUNT, mode)?,
            ),
            FunctionCode::ReadInputRegisters => Operation::ReadInputRegisters(
                Self::parse_read(cursor)?.validate(limits::MAX_READ_REGISTERS_COUNT, mode)?,
            ),
            FunctionCode::WriteSingleCoil => {
                let index = cursor.read_u16_be()?;
                let value = coil_from_u16(cursor.read_u16_be()?)?;
                cursor.expect_empty()?;
                Operation::WriteSingleCoil(Indexed::new(index, value))
            }
            FunctionCode::WriteSingleRegister => {
                let index = cursor.read_u16_be()?;
                let value = cursor.read_u16_be()?;
                cursor.expect_empty()?;
                Operation::WriteSingleRegister(Indexed::new(index, value))
            }
            FunctionCode::WriteMultipleCoils => {
                let range = AddressRange::parse(cursor)?;
                let byte_count = cursor.read_u8()? as usize;
                let range = range.validate(limits::MAX_WRITE_COILS_COUNT, mode)?;
                Self::expect_byte_count(num_bytes_for_bits(range.count), byte_count)?;
                Operation::WriteMultipleCoils(range, BitIterator::parse_all(range, cursor)?)
            }
            FunctionCode::WriteMultipleRegisters => {
                let range = AddressRange::parse(cursor)?;
                let byte_count = cursor.read_u8()? as usize;
                let range = range.validate(limits::MAX_WRITE_REGISTERS_COUNT, mode)?;
                Self::expect_byte_count(2 * range.count as usize, byte_count)?;
                Operation::WriteMultipleRegisters(
                    range,
                    RegisterIterator::parse_all(range, cursor)?,
                )
            }
        };

        Ok(operation)
    }

    fn parse_read(cursor: &mut ReadCursor) -> Result<AddressRange, AduParseError> {
        let range = AddressRange::parse(cursor)?;
        cursor.expect_empty()?;
        Ok(range)
    }

    fn expect_byte_count(expected: usize, actual: usize) -> Result<(), AduParseError> {
        if expected != actual {
            return Err(AduParseError::ByteCountMismatch(expected, actual));
        }
        Ok(())
    }

    /// Run the operation against the store, returning the response data
    pub(crate) fn execute(&self, store: &RegisterStore) -> Result<Vec<u8>, InternalError> {
        match self {
            Operation::ReadCoils(range) => Self::read_bits(
                *range,
                store.coils.read(range.start, range.count),
            ),
            Operation::ReadDiscreteInputs(range) => Self::read_bits(
                *range,
                store.discrete_inputs.read(range.start, range.count),
            ),
            Operation::ReadHoldingRegisters(range) => Self::read_registers(
                *range,
                store.holding_registers.read(range.start, range.count),
            ),
            Operation::ReadInputRegisters(range) => Self::read_registers(
                *range,
                store.input_registers.read(range.start, range.count),
            ),
            Operation::WriteSingleCoil(x) => {
                store.coils.set(x.index, x.value);
                Ok(register_count_payload(x.index, coil_to_u16(x.value)))
            }
            Operation::WriteSingleRegister(x) => {
                store.holding_registers.set(x.index, x.value);
                Ok(register_count_payload(x.index, x.value))
            }
            Operation::WriteMultipleCoils(range, iterator) => {
                store.coils.with(|bank| {
                    for x in *iterator {
                        bank.set(x.index, x.value);
                    }
                });
                Ok(register_count_payload(range.start, range.count))
            }
            Operation::WriteMultipleRegisters(range, iterator) => {
                store.holding_registers.with(|bank| {
                    for x in *iterator {
                        bank.set(x.index, x.value);
                    }
                });
                Ok(register_count_payload(range.start, range.count))
            }
        }
    }

    fn read_bits(range: AddressRange, values: Vec<bool>) -> Result<Vec<u8>, InternalError> {
        let packed = crate::common::bits::pack_bits(&values);
        let mut payload = Vec::with_capacity(1 + packed.len());
        payload.push(byte_count_for_bits(range.count)?);
        payload.extend(packed);
        Ok(payload)
    }

    fn read_registers(range: AddressRange, values: Vec<u16>) -> Result<Vec<u8>, InternalError> {
        let mut payload = Vec::with_capacity(1 + 2 * values.len());
        payload.push(byte_count_for_registers(range.count)?);
        for value in values {
            payload.extend_from_slice(&value.to_be_bytes());
        }
        Ok(payload)
    }
}

pub(crate) struct OperationDisplay<'a, 'b> {
    operation: &'a Operation<'b>,
    level: AppDecodeLevel,
}

impl<'a, 'b> OperationDisplay<'a, 'b> {
    pub(crate) fn new(level: AppDecodeLevel, operation: &'a Operation<'b>) -> Self {
        Self { operation, level }
    }
}

impl std::fmt::Display for OperationDisplay<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.operation.get_function())?;

        if self.level.data_headers() {
            match self.operation {
                Operation::ReadCoils(range)
                | Operation::ReadDiscreteInputs(range)
                | Operation::ReadHoldingRegisters(range)
                | Operation::ReadInputRegisters(range) => {
                    write!(f, " {range}")?;
                }
                Operation::WriteSingleCoil(request) => {
                    write!(f, " {request}")?;
                }
                Operation::WriteSingleRegister(request) => {
                    write!(f, " {request}")?;
                }
                Operation::WriteMultipleCoils(_, iterator) => {
                    write!(f, " {}", BitIteratorDisplay::new(self.level, *iterator))?;
                }
                Operation::WriteMultipleRegisters(_, iterator) => {
                    write!(
                        f,
                        " {}",
                        RegisterIteratorDisplay::new(self.level, *iterator)
                    )?;
                }
            }
        }

        Ok(())
    }
}
