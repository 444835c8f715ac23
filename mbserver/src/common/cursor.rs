use crate::error::AduParseError;

/// custom read-only cursor
pub(crate) struct ReadCursor<'a> {
    src: &'a [u8],
}

impl<'a> ReadCursor<'a> {
    pub(crate) fn new(src: &'a [u8]) -> ReadCursor<'a> {
        ReadCursor { src }
    }

    pub(crate) fn len(&self) -> usize {
        self.src.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    pub(crate) fn expect_empty(&self) -> Result<(), AduParseError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AduParseError::TrailingBytes(self.len()))
        }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, AduParseError> {
        match self.src.split_first() {
            Some((first, rest)) => {
                self.src = rest;
                Ok(*first)
            }
            None => Err(AduParseError::InsufficientBytes),
        }
    }

    pub(crate) fn read_u16_be(&mut self) -> Result<u16, AduParseError> {
        let high = self.read_u8()?;
        let low = self.read_u8()?;
        Ok((high as u16) << 8 | (low as u16))
    }

    pub(crate) fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], AduParseError> {
        match (self.src.get(0..count), self.src.get(count..)) {
            (Some(first), Some(rest)) => {
                self.src = rest;
                Ok(first)
            }
            _ => Err(AduParseError::InsufficientBytes),
        }
    }
}
