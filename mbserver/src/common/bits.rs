use crate::error::InternalError;

pub(crate) fn num_bytes_for_bits(count: u16) -> usize {
    (count as usize + 7) / 8
}

pub(crate) fn byte_count_for_bits(count: u16) -> Result<u8, InternalError> {
    let bytes = num_bytes_for_bits(count);
    u8::try_from(bytes).map_err(|_| InternalError::BadByteCount(bytes))
}

pub(crate) fn byte_count_for_registers(count: u16) -> Result<u8, InternalError> {
    let bytes = 2 * count as usize;
    u8::try_from(bytes).map_err(|_| InternalError::BadByteCount(bytes))
}

/// pack bits LSB first, the first value landing in bit 0 of the first byte
pub(crate) fn pack_bits(values: &[bool]) -> Vec<u8> {
    values
        .chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, bit)| if *bit { acc | (1 << i) } else { acc })
        })
        .collect()
}
