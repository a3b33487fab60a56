//! Big-endian primitive encoding shared by every protocol message.
//!
//! Integers are fixed 4-byte signed values, booleans a single 0/1 byte and
//! strings a 4-byte length followed by raw UTF-8. The reader checks every
//! field against the remaining input before consuming it, so a short or
//! hostile datagram surfaces as a [`DecodeError`] instead of a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::DecodeError;

/// Growable output buffer for one datagram.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: BytesMut,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_byte(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn write_int(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn write_float(&mut self, value: f32) {
        self.buf.put_u32(value.to_bits());
    }

    /// Writes a count or length as a 4-byte integer.
    ///
    /// Lengths above `i32::MAX` cannot be represented on the wire and are
    /// saturated; no datagram gets anywhere near that size.
    pub fn write_len(&mut self, len: usize) {
        self.write_int(i32::try_from(len).unwrap_or(i32::MAX));
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_len(value.len());
        self.buf.put_slice(value.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a received datagram.
#[derive(Debug)]
pub struct ByteReader<'a> {
    input: &'a [u8],
    total: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            total: input.len(),
        }
    }

    /// Byte offset of the next unread field.
    pub fn offset(&self) -> usize {
        self.total - self.input.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.input.remaining()
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.input.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_int(&mut self) -> Result<i32, DecodeError> {
        self.ensure(4)?;
        Ok(self.input.get_i32())
    }

    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        self.ensure(4)?;
        Ok(f32::from_bits(self.input.get_u32()))
    }

    /// Reads a 4-byte count, rejecting negative values.
    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        let offset = self.offset();
        let length = self.read_int()?;
        usize::try_from(length).map_err(|_| DecodeError::NegativeLength { offset, length })
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_len()?;
        let offset = self.offset();
        self.ensure(len)?;
        let (raw, rest) = self.input.split_at(len);
        self.input = rest;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    /// Fails if any input is left unread.
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.input.has_remaining() {
            return Err(DecodeError::TrailingBytes {
                offset: self.offset(),
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.input.remaining() < needed {
            return Err(DecodeError::Truncated {
                offset: self.offset(),
                needed,
                remaining: self.input.remaining(),
            });
        }
        Ok(())
    }
}
