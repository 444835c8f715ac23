use crate::common::phys::PhysLayer;
use crate::decode::PhysDecodeLevel;
use crate::error::{InternalError, RequestError};

/// Fixed capacity receive buffer used to reassemble frames from a byte stream
pub(crate) struct ReadBuffer {
    buffer: Vec<u8>,
    begin: usize,
    end: usize,
}

impl ReadBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        ReadBuffer {
            buffer: vec![0; capacity],
            begin: 0,
            end: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.begin
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub(crate) fn read(&mut self, count: usize) -> Result<&[u8], InternalError> {
        if self.len() < count {
            return Err(InternalError::InsufficientBytesForRead(count, self.len()));
        }

        match self.buffer.get(self.begin..(self.begin + count)) {
            Some(ret) => {
                self.begin += count;
                Ok(ret)
            }
            None => Err(InternalError::InsufficientBytesForRead(count, self.len())),
        }
    }

    pub(crate) fn peek_at(&self, idx: usize) -> Result<u8, InternalError> {
        match self.buffer.get(self.begin + idx) {
            Some(x) if idx < self.len() => Ok(*x),
            _ => Err(InternalError::InsufficientBytesForRead(idx + 1, self.len())),
        }
    }

    pub(crate) async fn read_some(
        &mut self,
        io: &mut PhysLayer,
        level: PhysDecodeLevel,
    ) -> Result<usize, RequestError> {
        // before we read any data, check to see if the buffer is empty and adjust the indices
        // this allows use to make the biggest read possible, and avoids subsequent buffer shifting later
        if self.is_empty() {
            self.begin = 0;
            self.end = 0;
        }

        // if we've reached capacity, but still need more data we have to shift
        if self.end == self.buffer.len() {
            let length = self.len();
            self.buffer.copy_within(self.begin..self.end, 0);
            self.begin = 0;
            self.end = length;
        }

        let count = io.read(&mut self.buffer[self.end..], level).await?;

        if count == 0 {
            return Err(RequestError::Io(std::io::ErrorKind::UnexpectedEof));
        }

        self.end += count;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_when_reading_too_many_bytes() {
        let mut buffer = ReadBuffer::new(10);
        assert_eq!(
            buffer.read(1),
            Err(InternalError::InsufficientBytesForRead(1, 0))
        );
        assert_eq!(
            buffer.peek_at(0),
            Err(InternalError::InsufficientBytesForRead(1, 0))
        );
    }

    #[tokio::test]
    async fn shifts_contents_when_buffer_at_capacity() {
        let mut buffer = ReadBuffer::new(3);
        let io = tokio_test::io::Builder::new()
            .read(&[0x01, 0x02, 0x03])
            .read(&[0x04, 0x05])
            .build();
        let mut phys = PhysLayer::new_mock(io);
        assert_eq!(
            buffer
                .read_some(&mut phys, PhysDecodeLevel::Nothing)
                .await
                .unwrap(),
            3
        );
        assert_eq!(buffer.read(2).unwrap(), &[0x01, 0x02]);
        assert_eq!(
            buffer
                .read_some(&mut phys, PhysDecodeLevel::Nothing)
                .await
                .unwrap(),
            2
        );
        assert_eq!(buffer.peek_at(2), Ok(0x05));
        assert_eq!(buffer.read(3).unwrap(), &[0x03, 0x04, 0x05]);
    }

    #[tokio::test]
    async fn end_of_stream_is_reported_as_an_error() {
        let mut buffer = ReadBuffer::new(3);
        let mut phys = PhysLayer::new_mock(tokio_test::io::Builder::new().build());
        assert_eq!(
            buffer.read_some(&mut phys, PhysDecodeLevel::Nothing).await,
            Err(RequestError::Io(std::io::ErrorKind::UnexpectedEof))
        );
    }
}
