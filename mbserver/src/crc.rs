//! Modbus variant of CRC-16 used to sign and validate RTU frames
//!
//! Reflected polynomial 0xA001, initial value 0xFFFF, no final XOR. The
//! 256-entry lookup table is built by a `const fn` at compile time, so there is
//! no lazy initialization and no locking on any call.

/// precomputes the CRC table as a constant!
const CRC: ::crc::Crc<u16> = ::crc::Crc::<u16>::new(&::crc::CRC_16_MODBUS);

/// Number of bytes a CRC occupies at the end of an RTU frame
pub const CRC_LENGTH: usize = 2;

/// Compute the Modbus CRC-16 of `bytes`
///
/// On the wire the result is appended little-endian, i.e. `compute(..).to_le_bytes()`.
pub fn compute(bytes: &[u8]) -> u16 {
    CRC.checksum(bytes)
}

/// Compute the CRC-16 over several discontiguous slices as if they were concatenated
pub(crate) fn compute_parts(parts: &[&[u8]]) -> u16 {
    let mut digest = CRC.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    // bit-at-a-time reference used to cross-check the table driven version
    fn reference(bytes: &[u8]) -> u16 {
        let mut crc: u16 = 0xFFFF;
        for byte in bytes {
            crc ^= *byte as u16;
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xA001
                } else {
                    crc >> 1
                };
            }
        }
        crc
    }

    #[test]
    fn computes_known_read_holding_registers_checksum() {
        let crc = compute(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(crc, 0x0A84);
        // the bytes as they appear on the wire, read as a big-endian word
        assert_eq!(crc.to_le_bytes(), [0x84, 0x0A]);
        assert_eq!(u16::from_be_bytes(crc.to_le_bytes()), 0x840A);
    }

    #[test]
    fn empty_input_yields_initial_value() {
        assert_eq!(compute(&[]), 0xFFFF);
    }

    #[test]
    fn matches_bitwise_reference() {
        let data: Vec<u8> = (0..=255u8).collect();
        for len in [1, 2, 7, 64, 255, 256] {
            assert_eq!(compute(&data[..len]), reference(&data[..len]));
        }
    }

    #[test]
    fn computing_twice_yields_the_same_value() {
        let data = [0x2A, 0x01, 0x00, 0x10, 0x00, 0x13];
        assert_eq!(compute(&data), compute(&data));
        assert_eq!(compute(&data), 0x197A);
    }

    #[test]
    fn parts_are_equivalent_to_concatenation() {
        let data = [0x2A, 0x10, 0x00, 0x10, 0x00, 0x02, 0x04, 0x12, 0x34, 0x56, 0x78];
        let (a, b) = data.split_at(2);
        assert_eq!(compute_parts(&[a, b]), compute(&data));
    }

    #[test]
    fn concurrent_callers_agree() {
        let data: Vec<u8> = (0..128u8).collect();
        let expected = reference(&data);

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let data = data.clone();
                std::thread::spawn(move || (0..100).map(|_| compute(&data)).collect::<Vec<_>>())
            })
            .collect();

        for thread in threads {
            for crc in thread.join().unwrap() {
                assert_eq!(crc, expected);
            }
        }
    }
}
