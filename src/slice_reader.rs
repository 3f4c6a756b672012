//! Cursor over the uncompressed prefix of a VP8 frame.
//!
//! The frame tag, start code, dimensions and partition size table are plain
//! little-endian bytes. [`SliceReader`] reads them without copying and reports
//! a short buffer as [`DecodeError::TruncatedInput`].

use byteorder_lite::{ByteOrder, LittleEndian};
use core::fmt;

use crate::DecodeError;

/// A reader that wraps a byte slice and tracks the current position.
#[derive(Clone)]
pub(crate) struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    #[inline]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset of the next unread byte.
    #[cfg(test)]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of bytes remaining from the current position.
    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Returns a slice of the remaining bytes.
    #[inline]
    pub(crate) fn remaining_slice(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Read exactly `N` bytes.
    #[inline]
    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take_slice(N)?);
        Ok(buf)
    }

    /// Read a u16 in little-endian byte order.
    #[inline]
    pub(crate) fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        Ok(LittleEndian::read_u16(self.take_slice(2)?))
    }

    /// Read a u24 in little-endian byte order (as u32).
    #[inline]
    pub(crate) fn read_u24_le(&mut self) -> Result<u32, DecodeError> {
        Ok(LittleEndian::read_u24(self.take_slice(3)?))
    }

    /// Take a slice of n bytes from the current position and advance position.
    /// Returns a slice reference without copying data.
    #[inline]
    pub(crate) fn take_slice(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::TruncatedInput)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

impl fmt::Debug for SliceReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceReader")
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .finish()
    }
}
