//! A trait for writing the bytes of a persisted frame table.

use crate::endianity::Endianity;
use crate::write::{Error, Result};

/// A trait for writing the data of a persisted frame table.
///
/// Lengths are patched after the fact via [`write_u32_at`](Writer::write_u32_at),
/// so implementations must support rewriting already-written bytes.
pub trait Writer {
    /// The endianity of bytes that are written.
    type Endian: Endianity;

    /// Return the endianity of bytes that are written.
    fn endian(&self) -> Self::Endian;

    /// Return the current buffer length.
    fn len(&self) -> usize;

    /// Return true if nothing has been written yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a slice.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Write a slice at a given offset.
    ///
    /// The write must not extend past the current buffer length.
    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;

    /// Write a u8.
    fn write_u8(&mut self, val: u8) -> Result<()> {
        let bytes = [val];
        self.write(&bytes)
    }

    /// Write a u16.
    fn write_u16(&mut self, val: u16) -> Result<()> {
        let mut bytes = [0; 2];
        Self::Endian::write_u16(&mut bytes, val);
        self.write(&bytes)
    }

    /// Write a u32.
    fn write_u32(&mut self, val: u32) -> Result<()> {
        let mut bytes = [0; 4];
        Self::Endian::write_u32(&mut bytes, val);
        self.write(&bytes)
    }

    /// Write a u64.
    fn write_u64(&mut self, val: u64) -> Result<()> {
        let mut bytes = [0; 8];
        Self::Endian::write_u64(&mut bytes, val);
        self.write(&bytes)
    }

    /// Write a u32 at the given offset.
    fn write_u32_at(&mut self, offset: usize, val: u32) -> Result<()> {
        let mut bytes = [0; 4];
        Self::Endian::write_u32(&mut bytes, val);
        self.write_at(offset, &bytes)
    }

    /// Write an address-sized integer.
    fn write_address(&mut self, val: u64, address_size: u8) -> Result<()> {
        match address_size {
            2 => {
                if val > u64::from(u16::MAX) {
                    return Err(Error::ValueTooLarge);
                }
                self.write_u16(val as u16)
            }
            4 => {
                if val > u64::from(u32::MAX) {
                    return Err(Error::ValueTooLarge);
                }
                self.write_u32(val as u32)
            }
            8 => self.write_u64(val),
            _ => Err(Error::ValueTooLarge),
        }
    }

    /// Write an unsigned LEB128 encoded integer.
    fn write_uleb128(&mut self, mut val: u64) -> Result<()> {
        loop {
            let mut byte = (val & 0x7f) as u8;
            val >>= 7;
            if val != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte)?;
            if val == 0 {
                return Ok(());
            }
        }
    }

    /// Write a signed LEB128 encoded integer.
    fn write_sleb128(&mut self, mut val: i64) -> Result<()> {
        loop {
            let mut byte = val as u8;
            // Keep the sign bit for testing.
            val >>= 6;
            let done = val == 0 || val == -1;
            if done {
                byte &= !0x80;
            } else {
                // Remove the sign bit.
                val >>= 1;
                byte |= 0x80;
            }
            self.write_u8(byte)?;
            if done {
                return Ok(());
            }
        }
    }
}
