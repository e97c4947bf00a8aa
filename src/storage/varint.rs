//! Variable-length integer encoding for record payloads
//!
//! Unsigned values use LEB128 (7 bits per byte, high bit = continuation).
//! Signed values are zigzag-mapped first so small negatives stay short.

use super::encoding::CodecError;

/// Append an unsigned varint
pub fn put_uvarint(out: &mut Vec<u8>, value: u64) {
    let mut v = value;
    loop {
        if v < 0x80 {
            out.push(v as u8);
            break;
        } else {
            out.push((v as u8) | 0x80);
            v >>= 7;
        }
    }
}

/// Append a zigzag-encoded signed varint
pub fn put_varint(out: &mut Vec<u8>, value: i64) {
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    put_uvarint(out, zigzag);
}

/// Append a length-prefixed UTF-8 string
pub fn put_str(out: &mut Vec<u8>, value: &str) {
    put_uvarint(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

/// Sequential reader over a payload slice
#[derive(Debug)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn uvarint(&mut self) -> Result<u64, CodecError> {
        let mut result: u64 = 0;
        let mut shift = 0;

        loop {
            let byte = self.u8()?;
            result |= ((byte & 0x7F) as u64) << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }

            shift += 7;
            if shift >= 64 {
                return Err(CodecError::VarintOverflow);
            }
        }
    }

    pub fn varint(&mut self) -> Result<i64, CodecError> {
        let zigzag = self.uvarint()?;
        Ok(((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64))
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        let value = self.uvarint()?;
        u32::try_from(value).map_err(|_| CodecError::VarintOverflow)
    }

    pub fn str(&mut self) -> Result<String, CodecError> {
        let len = self.uvarint()? as usize;
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        let bytes = self.data.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Fail if any bytes are left unread
    pub fn finish(self) -> Result<(), CodecError> {
        let remaining = self.data.len() - self.pos;
        if remaining > 0 {
            return Err(CodecError::TrailingBytes(remaining));
        }
        Ok(())
    }
}
