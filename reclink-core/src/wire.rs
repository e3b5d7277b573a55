//! Field-level encoding shared by every payload.
//!
//! All integers are little-endian. Strings are a `u16` byte length
//! followed by UTF-8 bytes; booleans are a single `0`/`1` byte.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Cursor over one frame's payload.
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, field: &'static str, len: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < len {
            return Err(ProtocolError::Truncated {
                field,
                needed: len - self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        self.need(field, 1)?;
        Ok(self.buf.get_u8())
    }

    pub fn i32(&mut self, field: &'static str) -> Result<i32, ProtocolError> {
        self.need(field, 4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn bool(&mut self, field: &'static str) -> Result<bool, ProtocolError> {
        match self.u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidBool(other)),
        }
    }

    pub fn string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        self.need(field, 2)?;
        let len = self.buf.get_u16_le() as usize;
        self.need(field, len)?;
        let (text, rest) = self.buf.split_at(len);
        self.buf = rest;
        String::from_utf8(text.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(field))
    }

    /// Fails if any payload bytes were left unread.
    pub fn finish(self) -> Result<(), ProtocolError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

pub fn put_bool(dst: &mut BytesMut, value: bool) {
    dst.put_u8(value as u8);
}

pub fn put_i32(dst: &mut BytesMut, value: i32) {
    dst.put_i32_le(value);
}

/// Writes a length-prefixed string. Strings longer than `u16::MAX`
/// bytes are rejected rather than truncated.
pub fn put_string(dst: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    let len = u16::try_from(value.len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: value.len(),
        max: u16::MAX as usize,
    })?;
    dst.put_u16_le(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}
