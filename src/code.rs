use crate::error::DecodeError;

/// Growing output buffer for the opcode stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeWriter {
    bytes: Vec<u8>,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    /// Bytes written so far; also the instruction pointer of the next instruction.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

/// Bounds-checked reader over an opcode stream.
#[derive(Clone, Debug)]
pub struct CodeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> CodeReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        CodeReader { bytes, pos: 0 }
    }

    /// Reader positioned at `pos`. Reads fail if `pos` is past the end.
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        CodeReader { bytes, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let truncated = DecodeError::Truncated { at: self.pos };
        let end = self.pos.checked_add(N).ok_or(truncated)?;
        let chunk = self.bytes.get(self.pos..end).ok_or(truncated)?;
        let mut out = [0; N];
        out.copy_from_slice(chunk);
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_ne_bytes(self.take()?))
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_ne_bytes(self.take()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_counts_bytes() {
        let mut out = CodeWriter::new();
        assert!(out.is_empty());
        out.put_u8(0x01);
        out.put_i32(-2);
        out.put_u32(3);
        assert_eq!(out.len(), 9);
    }

    #[test]
    fn reader_reads_what_writer_wrote() {
        let mut out = CodeWriter::new();
        out.put_u8(0xAB);
        out.put_i32(-123456);
        let bytes = out.into_inner();

        let mut reader = CodeReader::new(&bytes);
        assert_eq!(reader.u8(), Ok(0xAB));
        assert_eq!(reader.i32(), Ok(-123456));
        assert!(reader.is_at_end());
    }

    #[test]
    fn reader_never_reads_past_end() {
        let bytes = [1, 2, 3];
        let mut reader = CodeReader::at(&bytes, 1);
        assert_eq!(reader.u32(), Err(DecodeError::Truncated { at: 1 }));
        // A failed read does not move the cursor.
        assert_eq!(reader.pos(), 1);
        assert_eq!(reader.u8(), Ok(2));

        let mut reader = CodeReader::at(&bytes, 10);
        assert_eq!(reader.u8(), Err(DecodeError::Truncated { at: 10 }));
    }
}
